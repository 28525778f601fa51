use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bookings::Booking;
use crate::notifications::Notifier;
use crate::payments::error::PaymentError;
use crate::payments::gateway::{GatewayError, PaymentGateway};
use crate::payments::repository::PaymentsStore;
use crate::payments::status_machine::PaymentStateMachine;
use crate::payments::{to_cents, AuthorizationMode, Payment, PaymentStatus};

/// Result of opening (or re-opening) an authorization for a booking
#[derive(Debug)]
pub struct AuthorizationCreated {
    pub payment: Payment,
    /// Present only when a fresh intent was created; the client uses it to
    /// collect the card. Never re-issued for an existing authorization.
    pub client_secret: Option<String>,
    pub already_existed: bool,
}

/// Result of capturing the remaining balance
#[derive(Debug)]
pub enum CaptureOutcome {
    Captured { payment: Payment, receipt_sent: bool },
    /// The balance was already settled; nothing was charged and no receipt
    /// was re-sent.
    AlreadyCaptured { payment: Payment },
}

/// Orchestrates the payment lifecycle against the card gateway
///
/// Ordering discipline: every flow is guard, gateway call, compare-and-set.
/// Guards reject before any network traffic, so a precondition failure
/// never moves money. Gateway calls happen outside any database
/// transaction. A CAS miss means a concurrent actor advanced the row; the
/// service re-reads and either treats the outcome as already-done or
/// reports the conflict, never overwrites.
pub struct PaymentService {
    repo: Arc<dyn PaymentsStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    mode: AuthorizationMode,
}

impl PaymentService {
    pub fn new(
        repo: Arc<dyn PaymentsStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        mode: AuthorizationMode,
    ) -> Self {
        Self {
            repo,
            gateway,
            notifier,
            mode,
        }
    }

    /// Open a card authorization for a booking
    ///
    /// Idempotent per booking: if a live payment already exists it is
    /// returned as-is. A failed or cancelled payment is rearmed with a
    /// fresh intent so the customer can try another card. The hold amount
    /// depends on the configured mode: deposit only, or the full price.
    pub async fn create_authorization(
        &self,
        booking: &Booking,
        deposit: Decimal,
    ) -> Result<AuthorizationCreated, PaymentError> {
        let deposit_cents = to_cents(deposit);
        let total_cents = to_cents(booking.total_price);
        let hold_cents = match self.mode {
            AuthorizationMode::DepositHold => deposit_cents,
            AuthorizationMode::FullHold => total_cents,
        };

        if let Some(existing) = self.repo.find_by_booking_id(booking.id).await? {
            if !matches!(
                existing.status,
                PaymentStatus::Failed | PaymentStatus::Cancelled
            ) {
                info!(
                    booking_id = %booking.id,
                    payment_id = %existing.id,
                    status = %existing.status.as_str(),
                    "authorization already exists for booking"
                );
                return Ok(AuthorizationCreated {
                    payment: existing,
                    client_secret: None,
                    already_existed: true,
                });
            }

            // Dead payment: start a new cycle on the same row, reusing the
            // gateway customer.
            let intent = self
                .gateway
                .create_intent(hold_cents, &existing.gateway_customer_id, booking.id)
                .await?;

            let payment = self
                .repo
                .reauthorize(existing.id, &intent.id, deposit_cents, total_cents)
                .await?
                .ok_or(PaymentError::StateChanged)?;

            info!(
                booking_id = %booking.id,
                payment_id = %payment.id,
                payment_intent_id = %intent.id,
                "reauthorized payment after failure"
            );
            return Ok(AuthorizationCreated {
                payment,
                client_secret: intent.client_secret,
                already_existed: false,
            });
        }

        let customer = self
            .gateway
            .create_customer(
                &booking.email,
                &booking.customer_name(),
                &booking.phone,
                booking.id,
            )
            .await?;

        let intent = self
            .gateway
            .create_intent(hold_cents, &customer.id, booking.id)
            .await?;

        let payment = self
            .repo
            .create(booking.id, &intent.id, &customer.id, deposit_cents, total_cents)
            .await?;

        info!(
            booking_id = %booking.id,
            payment_id = %payment.id,
            payment_intent_id = %intent.id,
            hold_cents,
            "created payment authorization"
        );

        Ok(AuthorizationCreated {
            payment,
            client_secret: intent.client_secret,
            already_existed: false,
        })
    }

    /// Capture the deposit portion of the hold (booking confirmation)
    pub async fn capture_deposit(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self
            .repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if !PaymentStateMachine::can_capture_deposit(payment.status) {
            return Err(PaymentError::InvalidState {
                operation: "capture_deposit".to_string(),
                status: payment.status.as_str().to_string(),
            });
        }

        let captured = match self
            .gateway
            .capture(&payment.payment_intent_id, payment.deposit_amount)
            .await
        {
            Ok(captured) => captured,
            Err(e) => return Err(self.settle_gateway_failure(&payment, "Deposit capture", e).await),
        };

        match self
            .repo
            .mark_deposit_captured(payment.id, captured.payment_method_id.as_deref())
            .await?
        {
            Some(updated) => {
                info!(
                    payment_id = %updated.id,
                    deposit_cents = updated.deposit_amount,
                    "deposit captured"
                );
                Ok(updated)
            }
            None => {
                // Lost the race; accept the outcome if the row already
                // advanced past pending.
                let current = self.repo.current_status(payment.id).await?;
                if matches!(
                    current,
                    PaymentStatus::DepositCaptured | PaymentStatus::FullyCaptured
                ) {
                    self.repo
                        .find_by_id(payment.id)
                        .await?
                        .ok_or(PaymentError::NotFound)
                } else {
                    Err(PaymentError::StateChanged)
                }
            }
        }
    }

    /// Capture the remaining balance (service completion)
    ///
    /// Already-settled payments return `AlreadyCaptured` without touching
    /// the gateway. In deposit-hold mode the balance is a fresh off-session
    /// charge against the saved payment method; in full-hold mode the rest
    /// of the original hold is captured, falling back to the saved method
    /// when the hold has lapsed.
    pub async fn capture_remaining(
        &self,
        payment_id: Uuid,
        booking: &Booking,
    ) -> Result<CaptureOutcome, PaymentError> {
        let payment = self
            .repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if payment.status == PaymentStatus::FullyCaptured {
            info!(payment_id = %payment.id, "remaining balance already captured");
            return Ok(CaptureOutcome::AlreadyCaptured { payment });
        }

        if !PaymentStateMachine::can_capture_remaining(payment.status) {
            return Err(PaymentError::InvalidState {
                operation: "capture_remaining".to_string(),
                status: payment.status.as_str().to_string(),
            });
        }

        if self.mode == AuthorizationMode::DepositHold
            && payment.saved_payment_method_id.is_none()
        {
            return Err(PaymentError::NoSavedMethod);
        }

        if let Err(e) = self.charge_remaining_balance(&payment, booking).await {
            return Err(match e {
                GatewayError::RequiresAction { .. } => {
                    self.repo
                        .append_note(payment.id, "Remaining balance requires customer authentication")
                        .await?;
                    PaymentError::from(e)
                }
                other => {
                    // Balance-charge failures never regress the captured
                    // deposit; record and leave the status alone.
                    self.repo
                        .append_note(payment.id, &format!("Remaining balance charge failed: {other}"))
                        .await?;
                    PaymentError::from(other)
                }
            });
        }

        let note = format!(
            "Remaining balance of ${}.{:02} captured",
            payment.remaining_amount / 100,
            payment.remaining_amount % 100
        );
        let updated = match self.repo.mark_fully_captured(payment.id, &note).await? {
            Some(updated) => updated,
            None => {
                let current = self.repo.current_status(payment.id).await?;
                if current == PaymentStatus::FullyCaptured {
                    let payment = self
                        .repo
                        .find_by_id(payment.id)
                        .await?
                        .ok_or(PaymentError::NotFound)?;
                    return Ok(CaptureOutcome::AlreadyCaptured { payment });
                }
                return Err(PaymentError::StateChanged);
            }
        };

        info!(
            payment_id = %updated.id,
            remaining_cents = updated.remaining_amount,
            "remaining balance captured"
        );

        let receipt_sent = match self.notifier.completion_receipt(booking, &updated).await {
            Ok(()) => true,
            Err(e) => {
                warn!(payment_id = %updated.id, error = %e, "completion receipt not sent");
                false
            }
        };

        Ok(CaptureOutcome::Captured {
            payment: updated,
            receipt_sent,
        })
    }

    async fn charge_remaining_balance(
        &self,
        payment: &Payment,
        booking: &Booking,
    ) -> Result<(), GatewayError> {
        match self.mode {
            AuthorizationMode::DepositHold => {
                let method = payment
                    .saved_payment_method_id
                    .as_deref()
                    .ok_or_else(|| GatewayError::Protocol("no saved payment method".into()))?;
                self.gateway
                    .charge_saved_method(
                        &payment.gateway_customer_id,
                        method,
                        payment.remaining_amount,
                        booking.id,
                    )
                    .await?;
                Ok(())
            }
            AuthorizationMode::FullHold => {
                match self
                    .gateway
                    .capture(&payment.payment_intent_id, payment.remaining_amount)
                    .await
                {
                    Ok(_) => Ok(()),
                    // Hold lapsed or intent no longer capturable; charge the
                    // saved method instead when one exists.
                    Err(GatewayError::Protocol(reason)) => {
                        let method = payment
                            .saved_payment_method_id
                            .as_deref()
                            .ok_or(GatewayError::Protocol(reason))?;
                        warn!(
                            payment_id = %payment.id,
                            "hold no longer capturable, charging saved method"
                        );
                        self.gateway
                            .charge_saved_method(
                                &payment.gateway_customer_id,
                                method,
                                payment.remaining_amount,
                                booking.id,
                            )
                            .await?;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Refund the captured deposit (cancellation or no-show goodwill)
    pub async fn refund_deposit(
        &self,
        payment_id: Uuid,
        booking: &Booking,
        reason: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self
            .repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if !PaymentStateMachine::can_refund_deposit(payment.status) {
            return Err(PaymentError::InvalidState {
                operation: "refund_deposit".to_string(),
                status: payment.status.as_str().to_string(),
            });
        }

        let refund_id = match self
            .gateway
            .refund(&payment.payment_intent_id, payment.deposit_amount, reason)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.repo
                    .append_note(payment.id, &format!("Refund attempt failed: {e}"))
                    .await?;
                return Err(PaymentError::from(e));
            }
        };

        let note = format!("Deposit refunded ({refund_id}): {reason}");
        let updated = match self.repo.mark_refunded(payment.id, &note).await? {
            Some(updated) => updated,
            None => {
                let current = self.repo.current_status(payment.id).await?;
                if current == PaymentStatus::DepositRefunded {
                    self.repo
                        .find_by_id(payment.id)
                        .await?
                        .ok_or(PaymentError::NotFound)?
                } else {
                    return Err(PaymentError::StateChanged);
                }
            }
        };

        info!(
            payment_id = %updated.id,
            refund_id = %refund_id,
            "deposit refunded"
        );

        if let Err(e) = self.notifier.refund_receipt(booking, &updated).await {
            warn!(payment_id = %updated.id, error = %e, "refund receipt not sent");
        }

        Ok(updated)
    }

    /// Release the authorization without capturing (pre-completion
    /// cancellation). Uncaptured holds are voided at the gateway; funds are
    /// never moved.
    pub async fn cancel_authorization(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self
            .repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if !PaymentStateMachine::can_cancel_authorization(payment.status) {
            return Err(PaymentError::InvalidState {
                operation: "cancel_authorization".to_string(),
                status: payment.status.as_str().to_string(),
            });
        }

        // Voiding matters only while the hold is still open; a captured
        // deposit that the operator keeps needs no gateway call.
        if payment.status == PaymentStatus::Pending {
            if let Err(e) = self.gateway.cancel_intent(&payment.payment_intent_id).await {
                return Err(self
                    .settle_gateway_failure(&payment, "Authorization cancel", e)
                    .await);
            }
        }

        let updated = match self
            .repo
            .mark_cancelled(payment.id, "Authorization cancelled, funds released")
            .await?
        {
            Some(updated) => updated,
            None => {
                let current = self.repo.current_status(payment.id).await?;
                if current == PaymentStatus::Cancelled {
                    self.repo
                        .find_by_id(payment.id)
                        .await?
                        .ok_or(PaymentError::NotFound)?
                } else {
                    return Err(PaymentError::StateChanged);
                }
            }
        };

        info!(payment_id = %updated.id, "authorization cancelled");
        Ok(updated)
    }

    /// Payment owned by a booking, if one exists
    pub async fn find_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, PaymentError> {
        self.repo.find_by_booking_id(booking_id).await
    }

    /// Local payment record lookup
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        self.repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::NotFound)
    }

    /// Classify a failed gateway call and settle local state accordingly:
    /// confirmed declines mark the payment failed, ambiguous outcomes only
    /// leave a note so a retry or reconciliation can resolve them.
    async fn settle_gateway_failure(
        &self,
        payment: &Payment,
        operation: &str,
        error: GatewayError,
    ) -> PaymentError {
        let note = format!("{operation} failed: {error}");
        let result = match error {
            GatewayError::Declined(_) => {
                self.repo
                    .mark_failed_unless_settled(payment.id, &note)
                    .await
                    .map(|_| ())
            }
            GatewayError::Unavailable(_)
            | GatewayError::RequiresAction { .. }
            | GatewayError::Protocol(_) => self.repo.append_note(payment.id, &note).await,
        };

        if let Err(db_err) = result {
            warn!(payment_id = %payment.id, error = %db_err, "failed to record gateway failure");
        }

        PaymentError::from(error)
    }
}
