use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "purchase_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketPurchase {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub quantity: i32,
    pub buyer_email: String,
    pub buyer_first_name: String,
    pub buyer_last_name: String,
    pub payment_reference: String,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePurchaseData {
    pub ticket_id: Uuid,
    pub quantity: i32,
    pub buyer_email: String,
    pub buyer_first_name: String,
    pub buyer_last_name: String,
    pub payment_reference: String,
}

impl TicketPurchase {
    /// Inserts a pending purchase. Always called inside the orchestrator's
    /// transaction, alongside the inventory decrement.
    pub async fn create(
        conn: &mut PgConnection,
        data: CreatePurchaseData,
    ) -> Result<Self, sqlx::Error> {
        let purchase = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO ticket_purchases (
                ticket_id, quantity, buyer_email,
                buyer_first_name, buyer_last_name, payment_reference
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.ticket_id)
        .bind(data.quantity)
        .bind(&data.buyer_email)
        .bind(&data.buyer_first_name)
        .bind(&data.buyer_last_name)
        .bind(&data.payment_reference)
        .fetch_one(conn)
        .await?;

        Ok(purchase)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let purchase = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM ticket_purchases
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(purchase)
    }

    /// Moves the pending purchase for a payment reference into a terminal
    /// state. The `status = 'pending'` guard makes re-delivery a no-op;
    /// returns the number of rows actually transitioned.
    pub async fn transition_by_reference(
        conn: &mut PgConnection,
        payment_reference: &str,
        status: PurchaseStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE ticket_purchases
            SET status = $2, updated_at = NOW()
            WHERE payment_reference = $1 AND status = 'pending'
            "#,
        )
        .bind(payment_reference)
        .bind(status)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
