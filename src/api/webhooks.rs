use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use secrecy::ExposeSecret;

use crate::api::AppState;
use crate::error::AppError;
use crate::services::{signature, webhook};

const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Paystack webhook receiver. The signature is checked over the raw body
/// before anything is parsed. Once the signature is valid we always return
/// 200: reconciliation failures are logged and left to the out-of-band
/// sweep, never surfaced as webhook failures that would make the gateway
/// retry indefinitely.
async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    if body.is_empty() {
        return Err(AppError::Validation(
            "No request body provided".to_string(),
        ));
    }

    let provided_signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Signature)?;

    let secret = state.config.paystack_webhook_secret.expose_secret();
    if !signature::verify(&body, provided_signature, secret.as_bytes()) {
        tracing::warn!("Invalid Paystack webhook signature");
        return Err(AppError::Signature);
    }

    let event: webhook::WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            // Signed but unparseable: acknowledge, there is nothing a retry
            // of the same body could fix.
            tracing::warn!(error = %err, "Signed webhook body failed to parse");
            return Ok(StatusCode::OK);
        }
    };

    tracing::info!(event = %event.event, "Received Paystack webhook event");

    if let Err(err) = webhook::process_event(
        &state.pool,
        state.gateway.as_ref(),
        &state.redis,
        event,
    )
    .await
    {
        tracing::error!(error = %err, "Webhook reconciliation failed, acknowledging anyway");
    }

    Ok(StatusCode::OK)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/payment/webhook/paystack", post(paystack_webhook))
}
