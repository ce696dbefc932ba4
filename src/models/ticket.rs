use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Available,
    SoldOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price_minor: i64,
    pub currency: String,
    pub remaining_quantity: Option<i32>, // NULL means unlimited
    pub purchase_limit: Option<i32>,
    pub status: TicketStatus,
    pub resale_enabled: bool,
    pub max_resale_price_minor: Option<i64>,
    pub current_owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTicketData {
    pub event_id: Uuid,
    pub name: String,
    pub price_minor: i64,
    pub currency: String,
    pub remaining_quantity: Option<i32>,
    pub purchase_limit: Option<i32>,
    pub resale_enabled: bool,
    pub max_resale_price_minor: Option<i64>,
}

impl Ticket {
    /// Creates a ticket row. Ticket management proper lives in the CRUD
    /// module; this exists so the inventory store owns its schema and the
    /// integration tests can seed rows.
    pub async fn create(pool: &PgPool, data: CreateTicketData) -> Result<Self, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tickets (
                event_id, name, price_minor, currency,
                remaining_quantity, purchase_limit,
                resale_enabled, max_resale_price_minor
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.event_id)
        .bind(&data.name)
        .bind(data.price_minor)
        .bind(&data.currency)
        .bind(data.remaining_quantity)
        .bind(data.purchase_limit)
        .bind(data.resale_enabled)
        .bind(data.max_resale_price_minor)
        .fetch_one(pool)
        .await?;

        Ok(ticket)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(ticket)
    }

    /// Re-reads the ticket row under a pessimistic write lock. Blocks other
    /// transactions touching the same row until the caller's transaction
    /// ends, even if the distributed lock were bypassed.
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(ticket)
    }

    /// Writes the post-purchase inventory state. Only called while the
    /// caller's transaction holds the row lock.
    pub async fn update_inventory(
        conn: &mut PgConnection,
        id: Uuid,
        remaining_quantity: Option<i32>,
        status: TicketStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tickets
            SET remaining_quantity = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(remaining_quantity)
        .bind(status)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn set_owner(
        conn: &mut PgConnection,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tickets
            SET current_owner_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .execute(conn)
        .await?;

        Ok(())
    }
}
