use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{ServiceOffering, VehicleType};

/// Booking status enum representing the lifecycle of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    /// Parse status from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "no_show" => Ok(BookingStatus::NoShow),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }

    /// Whether a booking in this status still occupies its appointment
    /// window. Only cancellation frees a slot: a completed or no-show
    /// booking keeps blocking its window so the day's schedule stays
    /// consistent.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Pending
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain model representing a booking row
///
/// `booking_end_time` and `total_price` are derived once by
/// [`NewBooking::build`] and never recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub offering_id: i32,
    pub vehicle_type_id: i32,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub booking_end_time: NaiveTime,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub status: BookingStatus,
    pub is_confirmed: bool,
    pub total_price: Decimal,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Customer display name, used in notifications and gateway metadata
    pub fn customer_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A fully-derived booking candidate, ready for insertion
///
/// This is the write-once factory for the derived fields: the end time is
/// start + offering duration and the total price is offering price times the
/// vehicle multiplier. Neither is ever recomputed after this point.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub offering_id: i32,
    pub vehicle_type_id: i32,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub booking_end_time: NaiveTime,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub total_price: Decimal,
}

impl NewBooking {
    /// Derive end time and total price from the referenced catalog rows
    pub fn build(
        request: &CreateBookingRequest,
        offering: &ServiceOffering,
        vehicle_type: &VehicleType,
    ) -> Self {
        let end_time = request
            .booking_time
            .overflowing_add_signed(Duration::minutes(offering.duration_minutes as i64))
            .0;
        let total_price = (offering.price * vehicle_type.price_multiplier).round_dp(2);

        Self {
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.trim().to_string(),
            offering_id: offering.id,
            vehicle_type_id: vehicle_type.id,
            booking_date: request.booking_date,
            booking_time: request.booking_time,
            booking_end_time: end_time,
            address: request.address.trim().to_string(),
            city: request.city.trim().to_string(),
            zip_code: request.zip_code.trim().to_string(),
            total_price,
        }
    }
}

/// Request DTO for creating a booking
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom = "crate::validation::validate_phone")]
    pub phone: String,
    pub offering_id: i32,
    pub vehicle_type_id: i32,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    #[validate(length(min = 1, message = "Street address is required"))]
    pub address: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(custom = "crate::validation::validate_zip_code")]
    pub zip_code: String,
}

/// Request DTO for cancelling a booking
#[derive(Debug, Deserialize, Validate)]
pub struct CancelBookingRequest {
    #[validate(length(min = 1, max = 500, message = "A cancellation reason is required"))]
    pub reason: String,
}

/// Response DTO for a booking
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub offering_id: i32,
    pub vehicle_type_id: i32,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub booking_end_time: NaiveTime,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub status: BookingStatus,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            first_name: b.first_name,
            last_name: b.last_name,
            email: b.email,
            phone: b.phone,
            offering_id: b.offering_id,
            vehicle_type_id: b.vehicle_type_id,
            booking_date: b.booking_date,
            booking_time: b.booking_time,
            booking_end_time: b.booking_end_time,
            address: b.address,
            city: b.city,
            zip_code: b.zip_code,
            status: b.status,
            total_price: b.total_price,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

/// Response DTO for booking creation: the booking plus what the payment
/// client needs to confirm the authorization
#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking: BookingResponse,
    pub payment_id: Uuid,
    pub client_secret: Option<String>,
    pub deposit_amount_cents: i64,
    pub total_amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_area_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn offering(duration: i32, price: Decimal) -> ServiceOffering {
        ServiceOffering {
            id: 1,
            name: "Full Detail".to_string(),
            tier: "premium".to_string(),
            description: String::new(),
            price,
            deposit_amount: dec!(25.00),
            duration_minutes: duration,
            display_order: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn vehicle(multiplier: Decimal) -> VehicleType {
        VehicleType {
            id: 2,
            name: "SUV / Large Vehicle".to_string(),
            price_multiplier: multiplier,
            surcharge_note: String::new(),
            display_order: 1,
        }
    }

    fn request(time: NaiveTime) -> CreateBookingRequest {
        CreateBookingRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+13235551234".to_string(),
            offering_id: 1,
            vehicle_type_id: 2,
            booking_date: NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
            booking_time: time,
            address: "123 Main St".to_string(),
            city: "North Hollywood".to_string(),
            zip_code: "91602".to_string(),
        }
    }

    #[test]
    fn test_end_time_derived_from_duration() {
        let req = request(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        let new = NewBooking::build(&req, &offering(90, dec!(100.00)), &vehicle(dec!(1.00)));
        assert_eq!(new.booking_end_time, NaiveTime::from_hms_opt(11, 30, 0).unwrap());
    }

    #[test]
    fn test_total_price_applies_vehicle_multiplier() {
        let req = request(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        let new = NewBooking::build(&req, &offering(60, dec!(149.99)), &vehicle(dec!(1.25)));
        assert_eq!(new.total_price, dec!(187.49));
    }

    #[test]
    fn test_total_price_regular_vehicle_is_offering_price() {
        let req = request(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        let new = NewBooking::build(&req, &offering(60, dec!(59.99)), &vehicle(dec!(1.00)));
        assert_eq!(new.total_price, dec!(59.99));
    }

    #[test]
    fn test_only_cancelled_frees_a_slot() {
        assert!(BookingStatus::Pending.occupies_slot());
        assert!(BookingStatus::Confirmed.occupies_slot());
        assert!(BookingStatus::Completed.occupies_slot());
        assert!(BookingStatus::NoShow.occupies_slot());
        assert!(!BookingStatus::Cancelled.occupies_slot());
    }

    #[test]
    fn test_booking_status_round_trip() {
        for s in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
            BookingStatus::NoShow,
        ] {
            assert_eq!(BookingStatus::from_str(s.as_str()), Ok(s));
        }
        assert!(BookingStatus::from_str("noshow").is_err());
    }
}
