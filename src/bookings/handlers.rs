// HTTP handlers for booking endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::bookings::{
    BookingError, BookingResponse, BookingStatus, CancelBookingRequest, CreateBookingRequest,
    CreateBookingResponse,
};

/// Query parameters for the booking list
#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

/// Query parameters for the availability lookup
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

/// Occupied slots on one date
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub date: NaiveDate,
    /// "HH:MM" labels of 30-minute grid slots touched by a buffered booking
    pub occupied_slots: Vec<String>,
}

/// Handler for POST /api/bookings
/// Creates a booking and opens its payment authorization
pub async fn create_booking_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::ValidationError(e.to_string()))?;

    let response = state.booking_service.create_booking(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /api/bookings
pub async fn list_bookings_handler(
    State(state): State<crate::AppState>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<BookingResponse>>, BookingError> {
    let bookings = state
        .booking_service
        .list_bookings(query.date, query.status)
        .await?;

    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

/// Handler for GET /api/bookings/{id}
pub async fn get_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, BookingError> {
    let booking = state.booking_service.get_booking(id).await?;
    Ok(Json(booking.into()))
}

/// Handler for GET /api/bookings/{id}/payment
/// Retrieves the payment record owned by a booking
pub async fn get_booking_payment_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::payments::PaymentResponse>, BookingError> {
    // 404 for unknown bookings, not just missing payments
    state.booking_service.get_booking(id).await?;

    let payment = state
        .payment_service
        .find_by_booking(id)
        .await?
        .ok_or(crate::payments::PaymentError::NotFound)?;

    Ok(Json(payment.into()))
}

/// Handler for POST /api/bookings/{id}/confirm
/// Captures the deposit and confirms the booking
pub async fn confirm_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, BookingError> {
    let booking = state.booking_service.confirm_booking(id).await?;
    Ok(Json(booking.into()))
}

/// Handler for POST /api/bookings/{id}/complete
/// Captures the remaining balance and completes the booking
pub async fn complete_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, BookingError> {
    let booking = state.booking_service.complete_booking(id).await?;
    Ok(Json(booking.into()))
}

/// Handler for POST /api/bookings/{id}/cancel
pub async fn cancel_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<BookingResponse>, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::ValidationError(e.to_string()))?;

    let booking = state
        .booking_service
        .cancel_booking(id, &request.reason)
        .await?;
    Ok(Json(booking.into()))
}

/// Handler for POST /api/bookings/{id}/no-show
/// Marks a no-show; the deposit stays captured
pub async fn no_show_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, BookingError> {
    let booking = state.booking_service.mark_no_show(id).await?;
    Ok(Json(booking.into()))
}

/// Handler for GET /api/availability
pub async fn availability_handler(
    State(state): State<crate::AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, BookingError> {
    let occupied_slots = state
        .booking_service
        .occupied_slots_for_date(query.date)
        .await?;

    Ok(Json(AvailabilityResponse {
        date: query.date,
        occupied_slots,
    }))
}
