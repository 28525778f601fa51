use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::payments::gateway::GatewayError;

/// Error types for payment operations
///
/// Precondition violations and gateway failures are deliberately distinct:
/// the former never reach the gateway, and a "requires action" decline is
/// recoverable without a new booking, so it gets its own variant.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Payment not found")]
    NotFound,

    #[error("Operation not allowed in status {status}: {operation}")]
    InvalidState { operation: String, status: String },

    #[error("Payment requires customer authentication before the charge can complete")]
    RequiresAction,

    #[error("No saved payment method available; the customer must provide payment details")]
    NoSavedMethod,

    #[error("Payment state changed concurrently; operation not applied")]
    StateChanged,

    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::DatabaseError(err.to_string())
    }
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RequiresAction { .. } => PaymentError::RequiresAction,
            other => PaymentError::Gateway(other.to_string()),
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            PaymentError::DatabaseError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            PaymentError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Payment not found" }),
            ),
            PaymentError::InvalidState { operation, status } => (
                StatusCode::CONFLICT,
                json!({
                    "error": format!("Cannot {} while payment is {}", operation, status),
                }),
            ),
            PaymentError::RequiresAction => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "Payment requires customer authentication",
                    "requires_action": true,
                }),
            ),
            PaymentError::NoSavedMethod => (
                StatusCode::CONFLICT,
                json!({ "error": "No saved payment method found. Customer needs to provide payment details." }),
            ),
            PaymentError::StateChanged => (
                StatusCode::CONFLICT,
                json!({ "error": "Payment state changed concurrently; please retry" }),
            ),
            PaymentError::Gateway(msg) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
