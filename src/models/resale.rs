use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resale_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResaleStatus {
    Listed,
    Sold,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResaleListing {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub seller_id: Uuid,
    pub price_minor: i64,
    pub status: ResaleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateListingData {
    pub ticket_id: Uuid,
    pub seller_id: Uuid,
    pub price_minor: i64,
}

impl ResaleListing {
    pub async fn create(pool: &PgPool, data: CreateListingData) -> Result<Self, sqlx::Error> {
        let listing = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO resale_listings (ticket_id, seller_id, price_minor)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(data.ticket_id)
        .bind(data.seller_id)
        .bind(data.price_minor)
        .fetch_one(pool)
        .await?;

        Ok(listing)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let listing = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM resale_listings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(listing)
    }

    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let listing = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM resale_listings
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(listing)
    }

    /// Marks a listed listing as sold; returns the number of rows
    /// transitioned (0 when the listing already left the listed state).
    pub async fn mark_sold(conn: &mut PgConnection, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE resale_listings
            SET status = 'sold', updated_at = NOW()
            WHERE id = $1 AND status = 'listed'
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResaleHistory {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub previous_owner_id: Uuid,
    pub new_owner_id: Uuid,
    pub price_minor: i64,
    pub resold_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordResaleData {
    pub ticket_id: Uuid,
    pub previous_owner_id: Uuid,
    pub new_owner_id: Uuid,
    pub price_minor: i64,
}

impl ResaleHistory {
    pub async fn record(
        conn: &mut PgConnection,
        data: RecordResaleData,
    ) -> Result<Self, sqlx::Error> {
        let entry = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO resale_history (ticket_id, previous_owner_id, new_owner_id, price_minor)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.ticket_id)
        .bind(data.previous_owner_id)
        .bind(data.new_owner_id)
        .bind(data.price_minor)
        .fetch_one(conn)
        .await?;

        Ok(entry)
    }

    pub async fn list_by_ticket_id(
        pool: &PgPool,
        ticket_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let entries = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM resale_history
            WHERE ticket_id = $1
            ORDER BY resold_at DESC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}
