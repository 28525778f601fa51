use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status enum for the two-phase capture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    DepositCaptured,
    FullyCaptured,
    DepositRefunded,
    Cancelled,
    Failed,
}

impl PaymentStatus {
    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::DepositCaptured => "deposit_captured",
            PaymentStatus::FullyCaptured => "fully_captured",
            PaymentStatus::DepositRefunded => "deposit_refunded",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Parse status from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "deposit_captured" => Ok(PaymentStatus::DepositCaptured),
            "fully_captured" => Ok(PaymentStatus::FullyCaptured),
            "deposit_refunded" => Ok(PaymentStatus::DepositRefunded),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of the authorization hold opened by create_authorization
///
/// DepositHold opens the hold for the deposit only; the balance is later
/// charged off-session against the stored payment method. FullHold opens the
/// hold for the full total; the balance is captured from the existing hold,
/// falling back to the stored method when the hold has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationMode {
    DepositHold,
    FullHold,
}

impl AuthorizationMode {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "deposit_hold" => Ok(AuthorizationMode::DepositHold),
            "full_hold" => Ok(AuthorizationMode::FullHold),
            _ => Err(format!("Invalid authorization mode: {}", s)),
        }
    }
}

impl Default for AuthorizationMode {
    fn default() -> Self {
        AuthorizationMode::DepositHold
    }
}

/// Domain model for a payment row, one-to-one with its booking
///
/// All amounts are integer cents. `remaining_amount` is computed once at
/// creation as `total_amount - deposit_amount` and never changes (also
/// enforced by a CHECK constraint).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub payment_intent_id: String,
    pub gateway_customer_id: String,
    pub saved_payment_method_id: Option<String>,
    pub deposit_amount: i64,
    pub total_amount: i64,
    pub remaining_amount: i64,
    pub status: PaymentStatus,
    pub deposit_captured_at: Option<DateTime<Utc>>,
    pub fully_captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response DTO for a payment
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub status: PaymentStatus,
    pub deposit_amount: i64,
    pub total_amount: i64,
    pub remaining_amount: i64,
    pub deposit_captured_at: Option<DateTime<Utc>>,
    pub fully_captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub notes: String,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            booking_id: p.booking_id,
            status: p.status,
            deposit_amount: p.deposit_amount,
            total_amount: p.total_amount,
            remaining_amount: p.remaining_amount,
            deposit_captured_at: p.deposit_captured_at,
            fully_captured_at: p.fully_captured_at,
            refunded_at: p.refunded_at,
            notes: p.notes,
        }
    }
}

/// Convert a dollar amount to integer cents, rounding to the nearest cent
///
/// Payment math happens exclusively in cents; dollars exist only at the
/// catalog boundary.
pub fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .unwrap_or(0)
        .max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_cents_exact() {
        assert_eq!(to_cents(dec!(75.00)), 7500);
        assert_eq!(to_cents(dec!(25.00)), 2500);
        assert_eq!(to_cents(dec!(0.01)), 1);
    }

    #[test]
    fn test_to_cents_rounds_sub_cent() {
        assert_eq!(to_cents(dec!(187.4875)), 18749);
    }

    #[test]
    fn test_to_cents_never_negative() {
        assert_eq!(to_cents(dec!(-5.00)), 0);
    }

    #[test]
    fn test_payment_status_round_trip() {
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::DepositCaptured,
            PaymentStatus::FullyCaptured,
            PaymentStatus::DepositRefunded,
            PaymentStatus::Cancelled,
            PaymentStatus::Failed,
        ] {
            assert_eq!(PaymentStatus::from_str(s.as_str()), Ok(s));
        }
    }

    #[test]
    fn test_authorization_mode_parsing() {
        assert_eq!(
            AuthorizationMode::from_str("deposit_hold"),
            Ok(AuthorizationMode::DepositHold)
        );
        assert_eq!(
            AuthorizationMode::from_str("FULL_HOLD"),
            Ok(AuthorizationMode::FullHold)
        );
        assert!(AuthorizationMode::from_str("both").is_err());
    }
}
