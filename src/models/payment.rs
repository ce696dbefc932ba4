use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentData {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
}

impl Payment {
    pub async fn create(
        conn: &mut PgConnection,
        data: CreatePaymentData,
    ) -> Result<Self, sqlx::Error> {
        let payment = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO payments (reference, amount_minor, currency, email)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&data.reference)
        .bind(data.amount_minor)
        .bind(&data.currency)
        .bind(&data.email)
        .fetch_one(conn)
        .await?;

        Ok(payment)
    }

    pub async fn find_by_reference(
        pool: &PgPool,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let payment = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM payments
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(pool)
        .await?;

        Ok(payment)
    }

    /// Row-locked lookup used by the webhook reconciler so that duplicate
    /// deliveries of the same event serialize on the payment row.
    pub async fn find_by_reference_for_update(
        conn: &mut PgConnection,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let payment = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM payments
            WHERE reference = $1
            FOR UPDATE
            "#,
        )
        .bind(reference)
        .fetch_optional(conn)
        .await?;

        Ok(payment)
    }

    /// Applies the single allowed pending -> terminal transition; returns
    /// the number of rows transitioned (0 when the payment already left
    /// pending).
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatewayTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub gateway_reference: String,
    pub gateway_response: Option<JsonValue>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateGatewayTransactionData {
    pub payment_id: Uuid,
    pub gateway_reference: String,
    pub gateway_response: Option<JsonValue>,
}

impl GatewayTransaction {
    pub async fn create(
        conn: &mut PgConnection,
        data: CreateGatewayTransactionData,
    ) -> Result<Self, sqlx::Error> {
        let transaction = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO gateway_transactions (payment_id, gateway_reference, gateway_response)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(data.payment_id)
        .bind(&data.gateway_reference)
        .bind(&data.gateway_response)
        .fetch_one(conn)
        .await?;

        Ok(transaction)
    }

    /// Records the reconciliation outcome on the payment's transaction rows.
    pub async fn finalize(
        conn: &mut PgConnection,
        payment_id: Uuid,
        status: PaymentStatus,
        gateway_response: Option<JsonValue>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE gateway_transactions
            SET status = $2,
                gateway_response = COALESCE($3, gateway_response),
                updated_at = NOW()
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .bind(&gateway_response)
        .execute(conn)
        .await?;

        Ok(())
    }
}
