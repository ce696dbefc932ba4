//! Resale orchestrator.
//!
//! Structurally mirrors the purchase orchestrator, operating on a resale
//! listing instead of primary ticket inventory: lock on the listing, row
//! locks inside the transaction, payment initialization while the lock is
//! held, guaranteed release on all exit paths.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::{
    CreateGatewayTransactionData, CreatePaymentData, GatewayTransaction, Payment,
};
use crate::models::purchase::{CreatePurchaseData, TicketPurchase};
use crate::models::resale::{
    CreateListingData, RecordResaleData, ResaleHistory, ResaleListing, ResaleStatus,
};
use crate::models::ticket::Ticket;
use crate::services::payment_gateway::{ChargeRequest, PaymentGateway};
use crate::services::purchase::{generate_reference, PendingPurchase};
use crate::services::redis::{self, RedisService, LOCK_TTL_SECS};

#[derive(Debug, Clone)]
pub struct ListTicketRequest {
    pub ticket_id: Uuid,
    pub seller_id: Uuid,
    pub price_minor: i64,
}

#[derive(Debug, Clone)]
pub struct ListingPurchaseRequest {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub buyer_email: String,
    pub buyer_first_name: String,
    pub buyer_last_name: String,
}

/// Creates a resale listing. No distributed lock is needed here: nothing
/// shared is decremented, and the listing row itself is the unit being
/// created.
#[tracing::instrument(skip(pool, request), fields(ticket_id = %request.ticket_id))]
pub async fn list_ticket(
    pool: &PgPool,
    request: ListTicketRequest,
) -> Result<ResaleListing, AppError> {
    let ticket = Ticket::find_by_id(pool, request.ticket_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Ticket with ID {} not found", request.ticket_id))
        })?;

    validate_listing(&ticket, request.price_minor)?;

    let listing = ResaleListing::create(
        pool,
        CreateListingData {
            ticket_id: request.ticket_id,
            seller_id: request.seller_id,
            price_minor: request.price_minor,
        },
    )
    .await?;

    tracing::info!(listing_id = %listing.id, "Ticket listed for resale");

    Ok(listing)
}

/// Purchases a listed ticket from its seller.
#[tracing::instrument(
    skip(pool, redis, gateway, request),
    fields(listing_id = %request.listing_id)
)]
pub async fn purchase_listing(
    pool: &PgPool,
    redis: &RedisService,
    gateway: &dyn PaymentGateway,
    request: ListingPurchaseRequest,
) -> Result<PendingPurchase, AppError> {
    let lock_key = redis::resale_lock_key(request.listing_id);
    let acquired = redis.acquire_lock(&lock_key, LOCK_TTL_SECS).await?;
    if !acquired {
        tracing::info!("Listing lock held by another purchase");
        return Err(AppError::Contention(
            "Listing is currently being purchased, please retry".to_string(),
        ));
    }

    let result = purchase_listing_locked(pool, gateway, &request).await;

    if let Err(err) = redis.release_lock(&lock_key).await {
        tracing::warn!(
            error = %err,
            lock_key = %lock_key,
            "Failed to release listing lock; TTL will reclaim it"
        );
    }

    result
}

async fn purchase_listing_locked(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    request: &ListingPurchaseRequest,
) -> Result<PendingPurchase, AppError> {
    let mut tx = pool.begin().await?;

    let listing = ResaleListing::find_by_id_for_update(&mut *tx, request.listing_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Listing with ID {} not found", request.listing_id))
        })?;

    if listing.status != ResaleStatus::Listed {
        return Err(AppError::Contention(
            "Listing is no longer available".to_string(),
        ));
    }

    // Lock ordering is listing first, then ticket, in every resale path.
    let ticket = Ticket::find_by_id_for_update(&mut *tx, listing.ticket_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Ticket with ID {} not found", listing.ticket_id))
        })?;

    validate_listing(&ticket, listing.price_minor)?;

    let reference = generate_reference("RSL");

    let init = gateway
        .initialize(&ChargeRequest {
            amount_minor: listing.price_minor,
            currency: ticket.currency.clone(),
            email: request.buyer_email.clone(),
            reference: reference.clone(),
        })
        .await?;

    let transitioned = ResaleListing::mark_sold(&mut *tx, listing.id).await?;
    if transitioned == 0 {
        return Err(AppError::Contention(
            "Listing is no longer available".to_string(),
        ));
    }

    ResaleHistory::record(
        &mut *tx,
        RecordResaleData {
            ticket_id: ticket.id,
            previous_owner_id: listing.seller_id,
            new_owner_id: request.buyer_id,
            price_minor: listing.price_minor,
        },
    )
    .await?;

    Ticket::set_owner(&mut *tx, ticket.id, request.buyer_id).await?;

    let payment = Payment::create(
        &mut *tx,
        CreatePaymentData {
            reference: reference.clone(),
            amount_minor: listing.price_minor,
            currency: ticket.currency.clone(),
            email: request.buyer_email.clone(),
        },
    )
    .await?;

    GatewayTransaction::create(
        &mut *tx,
        CreateGatewayTransactionData {
            payment_id: payment.id,
            gateway_reference: init.gateway_reference,
            gateway_response: Some(init.raw),
        },
    )
    .await?;

    let purchase = TicketPurchase::create(
        &mut *tx,
        CreatePurchaseData {
            ticket_id: ticket.id,
            quantity: 1,
            buyer_email: request.buyer_email.clone(),
            buyer_first_name: request.buyer_first_name.clone(),
            buyer_last_name: request.buyer_last_name.clone(),
            payment_reference: reference.clone(),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        listing_id = %listing.id,
        purchase_id = %purchase.id,
        payment_reference = %reference,
        "Resale committed, awaiting payment confirmation"
    );

    Ok(PendingPurchase {
        purchase,
        payment_reference: reference,
        authorization_url: init.authorization_url,
    })
}

/// A listing is only valid while resale stays enabled on the ticket and the
/// price respects the seller's ceiling.
pub fn validate_listing(ticket: &Ticket, price_minor: i64) -> Result<(), AppError> {
    if !ticket.resale_enabled {
        return Err(AppError::Validation(
            "Ticket resale is not enabled".to_string(),
        ));
    }

    if let Some(max_price) = ticket.max_resale_price_minor {
        if price_minor > max_price {
            return Err(AppError::Validation(format!(
                "Resale price exceeds maximum allowed price of {max_price}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::TicketStatus;
    use chrono::Utc;

    fn resale_ticket(enabled: bool, max_price: Option<i64>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "VIP".to_string(),
            price_minor: 50_000,
            currency: "NGN".to_string(),
            remaining_quantity: Some(10),
            purchase_limit: None,
            status: TicketStatus::Available,
            resale_enabled: enabled,
            max_resale_price_minor: max_price,
            current_owner_id: Some(Uuid::new_v4()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_price_at_the_ceiling() {
        let t = resale_ticket(true, Some(60_000));
        assert!(validate_listing(&t, 60_000).is_ok());
    }

    #[test]
    fn rejects_price_above_the_ceiling() {
        let t = resale_ticket(true, Some(60_000));
        assert!(matches!(
            validate_listing(&t, 60_001),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_listing_when_resale_disabled() {
        let t = resale_ticket(false, None);
        assert!(matches!(
            validate_listing(&t, 10_000),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn no_ceiling_means_any_price() {
        let t = resale_ticket(true, None);
        assert!(validate_listing(&t, 1_000_000).is_ok());
    }
}
