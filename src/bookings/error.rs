use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::payments::PaymentError;

/// Error types for booking operations
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Booking not found")]
    NotFound,

    #[error("Service offering not found: {0}")]
    OfferingNotFound(i32),

    #[error("Vehicle type not found: {0}")]
    VehicleTypeNotFound(i32),

    #[error("Requested slot conflicts with an existing booking ({window})")]
    SlotConflict { window: String },

    #[error("Address is outside the service area: {message}")]
    OutOfServiceArea {
        message: String,
        distance_miles: Option<f64>,
    },

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            BookingError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": msg }),
            ),
            BookingError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Booking not found" }),
            ),
            BookingError::OfferingNotFound(id) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Service offering with id {} not found", id) }),
            ),
            BookingError::VehicleTypeNotFound(id) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Vehicle type with id {} not found", id) }),
            ),
            BookingError::SlotConflict { window } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "The requested time conflicts with an existing booking",
                    "conflict_window": window,
                }),
            ),
            BookingError::OutOfServiceArea { message, distance_miles } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": message,
                    "distance_miles": distance_miles,
                }),
            ),
            BookingError::InvalidTransition(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg }),
            ),
            BookingError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg }),
            ),
            BookingError::Payment(err) => return err.into_response(),
        };

        (status, Json(body)).into_response()
    }
}
