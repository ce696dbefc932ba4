//! Webhook reconciler.
//!
//! Maps signed gateway events onto local payment/purchase state transitions,
//! inside one transaction per event, idempotently. A success claim is never
//! trusted on its own: the charge is re-verified with the gateway before any
//! terminal transition is applied.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::payment::{GatewayTransaction, Payment, PaymentStatus};
use crate::models::purchase::{PurchaseStatus, TicketPurchase};
use crate::services::payment_gateway::{ChargeStatus, PaymentGateway};
use crate::services::redis::{RedisService, PAYMENT_EVENTS_CHANNEL};

pub const EVENT_SUCCESS: &str = "transaction.success";
pub const EVENT_FAILED: &str = "transaction.failed";
pub const EVENT_CHARGE_FAILED: &str = "charge.failed";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEventData {
    pub reference: Option<String>,
    #[serde(flatten)]
    pub rest: JsonValue,
}

/// What a delivery amounted to, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed,
    Cancelled,
    /// Payment already left pending; re-delivery is a no-op.
    AlreadyReconciled,
    /// No payment row for the reference; nothing to do.
    UnknownReference,
    /// Unrecognized or malformed event, ignored without error.
    Ignored,
}

/// Applies one verified webhook event. Errors returned here are logged by
/// the HTTP handler and never surfaced to the gateway.
#[tracing::instrument(skip(pool, gateway, redis, event), fields(event = %event.event))]
pub async fn process_event(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    redis: &RedisService,
    event: WebhookEvent,
) -> Result<ReconcileOutcome, AppError> {
    match event.event.as_str() {
        EVENT_SUCCESS => reconcile_success(pool, gateway, redis, event.data).await,
        EVENT_FAILED | EVENT_CHARGE_FAILED => reconcile_failure(pool, redis, event.data).await,
        other => {
            tracing::debug!(event = other, "Ignoring unrecognized webhook event");
            Ok(ReconcileOutcome::Ignored)
        }
    }
}

async fn reconcile_success(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    redis: &RedisService,
    data: WebhookEventData,
) -> Result<ReconcileOutcome, AppError> {
    let Some(reference) = data.reference else {
        tracing::warn!("Success event carried no reference, ignoring");
        return Ok(ReconcileOutcome::Ignored);
    };

    let mut tx = pool.begin().await?;

    let Some(payment) = Payment::find_by_reference_for_update(&mut *tx, &reference).await? else {
        // Gateway retried after we already pruned, or references diverged.
        // Not an error worth triggering a gateway retry.
        tracing::warn!(reference = %reference, "Payment record not found for webhook reference");
        return Ok(ReconcileOutcome::UnknownReference);
    };

    if payment.status != PaymentStatus::Pending {
        tracing::info!(
            reference = %reference,
            status = ?payment.status,
            "Payment already reconciled, skipping duplicate delivery"
        );
        return Ok(ReconcileOutcome::AlreadyReconciled);
    }

    // Defense against forged or stale webhook bodies: the event's own status
    // field is not enough, the gateway is asked directly.
    let verification = gateway.verify(&reference).await?;

    let outcome = if verification.status == ChargeStatus::Success {
        Payment::transition(&mut *tx, payment.id, PaymentStatus::Success).await?;
        GatewayTransaction::finalize(
            &mut *tx,
            payment.id,
            PaymentStatus::Success,
            Some(verification.raw),
        )
        .await?;
        TicketPurchase::transition_by_reference(&mut *tx, &reference, PurchaseStatus::Completed)
            .await?;
        tracing::info!(reference = %reference, "Payment successful, purchase completed");
        ReconcileOutcome::Completed
    } else {
        Payment::transition(&mut *tx, payment.id, PaymentStatus::Failed).await?;
        GatewayTransaction::finalize(
            &mut *tx,
            payment.id,
            PaymentStatus::Failed,
            Some(verification.raw),
        )
        .await?;
        TicketPurchase::transition_by_reference(&mut *tx, &reference, PurchaseStatus::Cancelled)
            .await?;
        tracing::warn!(
            reference = %reference,
            "Verification disagreed with success event, purchase cancelled"
        );
        ReconcileOutcome::Cancelled
    };

    tx.commit().await?;

    publish_payment_event(redis, outcome, &reference).await;

    Ok(outcome)
}

async fn reconcile_failure(
    pool: &PgPool,
    redis: &RedisService,
    data: WebhookEventData,
) -> Result<ReconcileOutcome, AppError> {
    let Some(reference) = data.reference else {
        tracing::warn!("Failure event carried no reference, ignoring");
        return Ok(ReconcileOutcome::Ignored);
    };

    let mut tx = pool.begin().await?;

    let Some(payment) = Payment::find_by_reference_for_update(&mut *tx, &reference).await? else {
        tracing::warn!(reference = %reference, "Payment record not found for failed webhook event");
        return Ok(ReconcileOutcome::UnknownReference);
    };

    if payment.status != PaymentStatus::Pending {
        tracing::info!(
            reference = %reference,
            status = ?payment.status,
            "Payment already reconciled, skipping duplicate delivery"
        );
        return Ok(ReconcileOutcome::AlreadyReconciled);
    }

    // A failure claim requires no trust upgrade; no independent verification.
    Payment::transition(&mut *tx, payment.id, PaymentStatus::Failed).await?;
    GatewayTransaction::finalize(&mut *tx, payment.id, PaymentStatus::Failed, Some(data.rest))
        .await?;
    TicketPurchase::transition_by_reference(&mut *tx, &reference, PurchaseStatus::Cancelled)
        .await?;

    tx.commit().await?;

    tracing::warn!(reference = %reference, "Payment failed, purchase cancelled");

    publish_payment_event(redis, ReconcileOutcome::Cancelled, &reference).await;

    Ok(ReconcileOutcome::Cancelled)
}

/// Best-effort fan-out for downstream consumers (notifications etc.); a
/// publish failure never fails the reconciliation that already committed.
async fn publish_payment_event(redis: &RedisService, outcome: ReconcileOutcome, reference: &str) {
    let event_name = match outcome {
        ReconcileOutcome::Completed => "PaymentSucceeded",
        ReconcileOutcome::Cancelled => "PaymentFailed",
        _ => return,
    };

    let message = serde_json::json!({
        "event": event_name,
        "paymentReference": reference,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    if let Err(err) = redis
        .publish(PAYMENT_EVENTS_CHANNEL, &message.to_string())
        .await
    {
        tracing::warn!(error = %err, "Failed to publish payment event");
    }
}
