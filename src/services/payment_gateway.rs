//! Payment gateway adapter.
//!
//! [`PaymentGateway`] is the seam the orchestrators and the webhook
//! reconciler talk to; [`PaystackGateway`] is the production implementation.
//! Both calls are plain network requests with no local state.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::config::Config;

/// Must stay under the distributed lock TTL: initialize runs while the
/// ticket lock is held.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub reference: String,
}

/// Result of a successful charge initialization.
#[derive(Debug, Clone)]
pub struct ChargeInit {
    pub gateway_reference: String,
    pub authorization_url: Option<String>,
    pub raw: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Success,
    Failed,
}

/// Result of an independent charge verification.
#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub status: ChargeStatus,
    pub raw: JsonValue,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initializes a remote charge tagged with our locally generated
    /// reference.
    async fn initialize(&self, charge: &ChargeRequest) -> Result<ChargeInit, GatewayError>;

    /// Re-verifies a charge directly with the gateway; the webhook payload's
    /// own status field is never trusted alone.
    async fn verify(&self, reference: &str) -> Result<ChargeVerification, GatewayError>;
}

pub struct PaystackGateway {
    client: Client,
    secret_key: Secret<String>,
    initialize_url: String,
    verify_url: String,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    amount: i64,
    email: &'a str,
    currency: &'a str,
    reference: &'a str,
}

impl PaystackGateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(GATEWAY_TIMEOUT).build()?;

        Ok(Self {
            client,
            secret_key: config.paystack_secret_key.clone(),
            initialize_url: config.paystack_initialize_url.trim_end_matches('/').to_string(),
            verify_url: config.paystack_verify_url.trim_end_matches('/').to_string(),
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.secret_key.expose_secret())
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    #[tracing::instrument(skip(self, charge), fields(reference = %charge.reference))]
    async fn initialize(&self, charge: &ChargeRequest) -> Result<ChargeInit, GatewayError> {
        let body = InitializeBody {
            amount: charge.amount_minor,
            email: &charge.email,
            currency: &charge.currency,
            reference: &charge.reference,
        };

        let response = self
            .client
            .post(&self.initialize_url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: JsonValue = response.json().await.map_err(|e| {
            GatewayError::InvalidResponse(format!("Failed to parse initialize response: {e}"))
        })?;

        let accepted = payload
            .get("status")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        if !status.is_success() || !accepted {
            let message = payload
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("transaction initialization failed");
            tracing::error!(
                http_status = %status,
                message = %message,
                "Paystack initialize failed"
            );
            return Err(GatewayError::Rejected(format!(
                "Status {status}: {message}"
            )));
        }

        let gateway_reference = payload
            .pointer("/data/reference")
            .and_then(JsonValue::as_str)
            .unwrap_or(&charge.reference)
            .to_string();
        let authorization_url = payload
            .pointer("/data/authorization_url")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        tracing::info!(
            gateway_reference = %gateway_reference,
            "Paystack transaction initialized, waiting for webhook confirmation"
        );

        Ok(ChargeInit {
            gateway_reference,
            authorization_url,
            raw: payload,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        let url = format!("{}/{}", self.verify_url, reference);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await?;

        let http_status = response.status();
        let payload: JsonValue = response.json().await.map_err(|e| {
            GatewayError::InvalidResponse(format!("Failed to parse verify response: {e}"))
        })?;

        if !http_status.is_success() {
            let message = payload
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("transaction verification failed");
            return Err(GatewayError::Rejected(format!(
                "Status {http_status}: {message}"
            )));
        }

        let confirmed = payload
            .get("status")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
            && payload
                .pointer("/data/status")
                .and_then(JsonValue::as_str)
                .map(|s| s == "success")
                .unwrap_or(false);

        let status = if confirmed {
            ChargeStatus::Success
        } else {
            ChargeStatus::Failed
        };

        tracing::info!(verified = confirmed, "Paystack transaction verified");

        Ok(ChargeVerification {
            status,
            raw: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_uri: &str) -> Config {
        Config {
            database_url: "postgres://localhost/boxoffice_test".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            paystack_secret_key: Secret::new("sk_test_secret".to_string()),
            paystack_webhook_secret: Secret::new("whsec_test".to_string()),
            paystack_initialize_url: format!("{server_uri}/transaction/initialize"),
            paystack_verify_url: format!("{server_uri}/transaction/verify"),
        }
    }

    fn charge() -> ChargeRequest {
        ChargeRequest {
            amount_minor: 50_000,
            currency: "NGN".to_string(),
            email: "buyer@example.com".to_string(),
            reference: "TKT-abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn initialize_returns_authorization_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test_secret"))
            .and(body_partial_json(serde_json::json!({
                "amount": 50_000,
                "reference": "TKT-abc123",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc123",
                    "access_code": "abc123",
                    "reference": "TKT-abc123"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&test_config(&server.uri())).unwrap();
        let init = gateway.initialize(&charge()).await.unwrap();

        assert_eq!(init.gateway_reference, "TKT-abc123");
        assert_eq!(
            init.authorization_url.as_deref(),
            Some("https://checkout.paystack.com/abc123")
        );
    }

    #[tokio::test]
    async fn initialize_rejection_is_a_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": false,
                "message": "Invalid amount"
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&test_config(&server.uri())).unwrap();
        let result = gateway.initialize(&charge()).await;

        assert!(matches!(result, Err(GatewayError::Rejected(_))));
    }

    #[tokio::test]
    async fn initialize_http_error_is_a_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": false,
                "message": "Invalid key"
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&test_config(&server.uri())).unwrap();
        let result = gateway.initialize(&charge()).await;

        assert!(matches!(result, Err(GatewayError::Rejected(_))));
    }

    #[tokio::test]
    async fn verify_maps_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/TKT-abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Verification successful",
                "data": { "status": "success", "reference": "TKT-abc123" }
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&test_config(&server.uri())).unwrap();
        let verification = gateway.verify("TKT-abc123").await.unwrap();

        assert_eq!(verification.status, ChargeStatus::Success);
    }

    #[tokio::test]
    async fn verify_maps_non_success_data_status_to_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/TKT-abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Verification successful",
                "data": { "status": "abandoned", "reference": "TKT-abc123" }
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&test_config(&server.uri())).unwrap();
        let verification = gateway.verify("TKT-abc123").await.unwrap();

        assert_eq!(verification.status, ChargeStatus::Failed);
    }
}
