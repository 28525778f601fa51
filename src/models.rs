use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// A bookable service offering in the catalog
///
/// Price, deposit and duration are snapshotted onto bookings at creation
/// time, so editing an offering never retroactively changes an existing
/// booking.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ServiceOffering {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "Full Interior & Exterior Detail")]
    pub name: String,
    #[schema(example = "premium", pattern = "basic|premium|deluxe")]
    pub tier: String,
    #[schema(example = "Complete hand wash, clay bar, interior shampoo")]
    pub description: String,
    /// Base price in dollars
    #[schema(value_type = f64, example = 149.99)]
    pub price: Decimal,
    /// Upfront deposit in dollars
    #[schema(value_type = f64, example = 25.00)]
    pub deposit_amount: Decimal,
    /// Duration in minutes
    #[schema(example = 120)]
    pub duration_minutes: i32,
    #[schema(example = 0)]
    pub display_order: i32,
    #[schema(example = true)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A vehicle type with its price multiplier
///
/// Booking totals are offering price times the vehicle type multiplier,
/// frozen on the booking row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct VehicleType {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "SUV / Large Vehicle")]
    pub name: String,
    #[schema(value_type = f64, example = 1.25)]
    pub price_multiplier: Decimal,
    #[schema(example = "Larger surface area")]
    pub surcharge_note: String,
    #[schema(example = 1)]
    pub display_order: i32,
}

/// Request body for creating a service offering
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOffering {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "Express Wash")]
    pub name: String,
    #[validate(custom = "crate::validation::validate_tier")]
    #[schema(example = "basic", pattern = "basic|premium|deluxe")]
    pub tier: String,
    #[schema(example = "Quick exterior hand wash")]
    pub description: String,
    #[schema(value_type = f64, example = 59.99)]
    pub price: Decimal,
    #[schema(value_type = f64, example = 25.00)]
    pub deposit_amount: Decimal,
    #[validate(range(min = 15, max = 480, message = "Duration must be 15-480 minutes"))]
    #[schema(example = 60)]
    pub duration_minutes: i32,
    #[serde(default)]
    #[schema(example = 0)]
    pub display_order: i32,
    #[serde(default = "default_true")]
    #[schema(example = true)]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Request body for updating a service offering
/// All fields are optional to support partial updates
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOffering {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub tier: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = f64)]
    pub price: Option<Decimal>,
    #[schema(value_type = f64)]
    pub deposit_amount: Option<Decimal>,
    #[validate(range(min = 15, max = 480, message = "Duration must be 15-480 minutes"))]
    pub duration_minutes: Option<i32>,
    pub display_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_offering_serialization() {
        let offering = ServiceOffering {
            id: 1,
            name: "Full Detail".to_string(),
            tier: "premium".to_string(),
            description: "Complete detail".to_string(),
            price: dec!(149.99),
            deposit_amount: dec!(25.00),
            duration_minutes: 120,
            display_order: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&offering).expect("Failed to serialize ServiceOffering");

        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"name\":\"Full Detail\""));
        assert!(json.contains("\"tier\":\"premium\""));
        assert!(json.contains("\"price\":\"149.99\""));
        assert!(json.contains("\"deposit_amount\":\"25.00\""));
        assert!(json.contains("\"duration_minutes\":120"));
    }

    #[test]
    fn test_create_offering_deserialization() {
        let json = r#"{
            "name": "Express Wash",
            "tier": "basic",
            "description": "Quick exterior hand wash",
            "price": "59.99",
            "deposit_amount": "25.00",
            "duration_minutes": 60
        }"#;

        let create: CreateOffering = serde_json::from_str(json)
            .expect("Failed to deserialize CreateOffering");

        assert_eq!(create.name, "Express Wash");
        assert_eq!(create.tier, "basic");
        assert_eq!(create.price, dec!(59.99));
        assert_eq!(create.deposit_amount, dec!(25.00));
        assert_eq!(create.duration_minutes, 60);
        // defaults applied for omitted fields
        assert_eq!(create.display_order, 0);
        assert!(create.is_active);
    }

    #[test]
    fn test_update_offering_partial_fields() {
        let json = r#"{
            "price": "79.99"
        }"#;

        let update: UpdateOffering = serde_json::from_str(json)
            .expect("Failed to deserialize UpdateOffering");

        assert_eq!(update.price, Some(dec!(79.99)));
        assert_eq!(update.name, None);
        assert_eq!(update.duration_minutes, None);
        assert_eq!(update.is_active, None);
    }
}
