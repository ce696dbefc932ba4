use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::payment_gateway::GatewayError;
use crate::services::redis::LockError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Contention(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid webhook signature")]
    Signature,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable kind, returned alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Contention(_) => "contention",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Gateway(_) => "gateway",
            AppError::BackendUnavailable(_) => "backend_unavailable",
            AppError::Signature => "signature",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<LockError> for AppError {
    fn from(err: LockError) -> Self {
        // Breaker-open and backend failures both mean "could not determine
        // lock state"; callers must refuse to proceed rather than assume
        // the lock was acquired.
        AppError::BackendUnavailable(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Contention(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Gateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::BackendUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Signature => (
                StatusCode::BAD_REQUEST,
                "Invalid webhook signature".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
