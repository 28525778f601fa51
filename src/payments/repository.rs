use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::payments::error::PaymentError;
use crate::payments::{Payment, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, booking_id, payment_intent_id, gateway_customer_id, \
     saved_payment_method_id, deposit_amount, total_amount, remaining_amount, status, \
     deposit_captured_at, fully_captured_at, refunded_at, notes, created_at, updated_at";

/// Storage operations for payment rows
///
/// Every status update is compare-and-set on the statuses the operation's
/// precondition allows, and `None` from a `mark_*` method means another
/// actor (operator call or webhook reconciliation) got there first. Callers
/// re-read and decide — no unconditional status writes exist here. The
/// service and webhook layers depend on this trait, not on the Postgres
/// implementation.
#[async_trait]
pub trait PaymentsStore: Send + Sync {
    /// Insert a new pending payment for a booking
    async fn create(
        &self,
        booking_id: Uuid,
        payment_intent_id: &str,
        gateway_customer_id: &str,
        deposit_amount: i64,
        total_amount: i64,
    ) -> Result<Payment, PaymentError>;

    /// Rearm a failed or cancelled payment with a fresh intent
    async fn reauthorize(
        &self,
        id: Uuid,
        payment_intent_id: &str,
        deposit_amount: i64,
        total_amount: i64,
    ) -> Result<Option<Payment>, PaymentError>;

    /// Find a payment by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, PaymentError>;

    /// Find the payment owned by a booking
    async fn find_by_booking_id(&self, booking_id: Uuid) -> Result<Option<Payment>, PaymentError>;

    /// Find a payment by the gateway's payment-intent id (reconciliation)
    async fn find_by_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Payment>, PaymentError>;

    /// CAS pending → deposit_captured
    async fn mark_deposit_captured(
        &self,
        id: Uuid,
        payment_method_id: Option<&str>,
    ) -> Result<Option<Payment>, PaymentError>;

    /// CAS deposit_captured → fully_captured
    async fn mark_fully_captured(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Payment>, PaymentError>;

    /// CAS {deposit_captured, fully_captured} → deposit_refunded
    async fn mark_refunded(&self, id: Uuid, note: &str) -> Result<Option<Payment>, PaymentError>;

    /// CAS {pending, deposit_captured} → cancelled
    async fn mark_cancelled(&self, id: Uuid, note: &str) -> Result<Option<Payment>, PaymentError>;

    /// Move to failed unless the payment already reached a terminal success
    async fn mark_failed_unless_settled(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Payment>, PaymentError>;

    /// Record an operational note without touching status
    async fn append_note(&self, id: Uuid, note: &str) -> Result<(), PaymentError>;

    /// Current status only, for post-CAS re-validation
    async fn current_status(&self, id: Uuid) -> Result<PaymentStatus, PaymentError>;
}

/// Postgres-backed payments store
#[derive(Clone)]
pub struct PaymentsRepository {
    pool: PgPool,
}

impl PaymentsRepository {
    /// Create a new PaymentsRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentsStore for PaymentsRepository {
    /// Insert a new pending payment for a booking
    ///
    /// The UNIQUE constraint on booking_id is the storage-level backstop for
    /// create_authorization idempotence; a second insert for the same
    /// booking fails instead of creating a second live payment.
    async fn create(
        &self,
        booking_id: Uuid,
        payment_intent_id: &str,
        gateway_customer_id: &str,
        deposit_amount: i64,
        total_amount: i64,
    ) -> Result<Payment, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments
                (booking_id, payment_intent_id, gateway_customer_id,
                 deposit_amount, total_amount, remaining_amount, status)
            VALUES ($1, $2, $3, $4, $5, $5 - $4, 'pending')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(payment_intent_id)
        .bind(gateway_customer_id)
        .bind(deposit_amount)
        .bind(total_amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Rearm a failed or cancelled payment with a fresh intent
    ///
    /// A booking owns at most one payment row, so starting a new
    /// authorization cycle rewrites the dead row in place. CAS on the two
    /// dead statuses: if reconciliation revived or re-failed the row
    /// concurrently this returns None.
    async fn reauthorize(
        &self,
        id: Uuid,
        payment_intent_id: &str,
        deposit_amount: i64,
        total_amount: i64,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET payment_intent_id = $2,
                deposit_amount = $3,
                total_amount = $4,
                remaining_amount = $4 - $3,
                status = 'pending',
                deposit_captured_at = NULL,
                fully_captured_at = NULL,
                refunded_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('failed', 'cancelled')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(payment_intent_id)
        .bind(deposit_amount)
        .bind(total_amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Find a payment by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Find the payment owned by a booking
    async fn find_by_booking_id(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Find a payment by the gateway's payment-intent id (reconciliation)
    async fn find_by_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_intent_id = $1"
        ))
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// CAS pending → deposit_captured, stamping the capture time and storing
    /// the reusable payment-method token when the gateway returned one
    async fn mark_deposit_captured(
        &self,
        id: Uuid,
        payment_method_id: Option<&str>,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'deposit_captured',
                deposit_captured_at = NOW(),
                saved_payment_method_id = COALESCE($2, saved_payment_method_id),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(payment_method_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// CAS deposit_captured → fully_captured
    async fn mark_fully_captured(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'fully_captured',
                fully_captured_at = NOW(),
                notes = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'deposit_captured'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// CAS {deposit_captured, fully_captured} → deposit_refunded
    async fn mark_refunded(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'deposit_refunded',
                refunded_at = NOW(),
                notes = $2,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('deposit_captured', 'fully_captured')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// CAS {pending, deposit_captured} → cancelled (hold released)
    async fn mark_cancelled(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'cancelled',
                notes = $2,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'deposit_captured')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Move to failed unless the payment already reached a terminal success
    /// state. Used by confirmed declines and failed-event reconciliation;
    /// the guard makes re-delivered failure events monotonic.
    async fn mark_failed_unless_settled(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'failed',
                notes = $2,
                updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('fully_captured', 'deposit_refunded', 'failed')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Record an operational note without touching status (ambiguous or
    /// recoverable gateway outcomes)
    async fn append_note(&self, id: Uuid, note: &str) -> Result<(), PaymentError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET notes = CASE WHEN notes = '' THEN $2 ELSE notes || E'\n' || $2 END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(note)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current status only, for post-CAS re-validation
    async fn current_status(&self, id: Uuid) -> Result<PaymentStatus, PaymentError> {
        let status: Option<PaymentStatus> =
            sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        status.ok_or(PaymentError::NotFound)
    }
}
