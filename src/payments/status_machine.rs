use crate::payments::PaymentStatus;

/// Service for managing payment status transitions
///
/// The `can_*` predicates are the precondition guards from the operation
/// contracts; every mutating payment operation checks its predicate before
/// any gateway call, and every repository update is compare-and-set on the
/// statuses the predicate allows, so the same table doubles as the
/// concurrency guard.
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - Pending → DepositCaptured, Cancelled, Failed
    /// - DepositCaptured → FullyCaptured, DepositRefunded, Cancelled, Failed
    /// - FullyCaptured → DepositRefunded (deposit-only refund after full capture)
    /// - Cancelled → Failed (a late failure event from the gateway still
    ///   records the decline; no money was kept either way)
    /// - DepositRefunded, Failed → (terminal)
    /// - Any status → Same status (idempotent)
    pub fn is_valid_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        if from == to {
            return true;
        }

        match (from, to) {
            (PaymentStatus::Pending, PaymentStatus::DepositCaptured) => true,
            (PaymentStatus::Pending, PaymentStatus::Cancelled) => true,
            (PaymentStatus::Pending, PaymentStatus::Failed) => true,

            (PaymentStatus::DepositCaptured, PaymentStatus::FullyCaptured) => true,
            (PaymentStatus::DepositCaptured, PaymentStatus::DepositRefunded) => true,
            (PaymentStatus::DepositCaptured, PaymentStatus::Cancelled) => true,
            (PaymentStatus::DepositCaptured, PaymentStatus::Failed) => true,

            (PaymentStatus::FullyCaptured, PaymentStatus::DepositRefunded) => true,

            (PaymentStatus::Cancelled, PaymentStatus::Failed) => true,

            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    pub fn transition(from: PaymentStatus, to: PaymentStatus) -> Result<PaymentStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid payment transition from {} to {}", from, to))
        }
    }

    /// Money has been collected and must never be forgotten: a failed event
    /// from the gateway is not allowed to overwrite these states.
    pub fn is_terminal_success(status: PaymentStatus) -> bool {
        matches!(
            status,
            PaymentStatus::FullyCaptured | PaymentStatus::DepositRefunded
        )
    }

    /// captureDeposit precondition: only an untouched authorization
    pub fn can_capture_deposit(status: PaymentStatus) -> bool {
        status == PaymentStatus::Pending
    }

    /// captureRemaining precondition: deposit captured, or already fully
    /// captured (the latter is a no-op success for at-least-once callers)
    pub fn can_capture_remaining(status: PaymentStatus) -> bool {
        matches!(
            status,
            PaymentStatus::DepositCaptured | PaymentStatus::FullyCaptured
        )
    }

    /// refundDeposit precondition: a captured deposit exists
    pub fn can_refund_deposit(status: PaymentStatus) -> bool {
        matches!(
            status,
            PaymentStatus::DepositCaptured | PaymentStatus::FullyCaptured
        )
    }

    /// cancelAuthorization precondition: the hold has not been captured past
    /// the deposit. Pending is included so a booking cancelled before its
    /// deposit capture can still release the untouched hold.
    pub fn can_cancel_authorization(status: PaymentStatus) -> bool {
        matches!(
            status,
            PaymentStatus::Pending | PaymentStatus::DepositCaptured
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_deposit_captured() {
        assert!(PaymentStateMachine::is_valid_transition(
            PaymentStatus::Pending,
            PaymentStatus::DepositCaptured
        ));
    }

    #[test]
    fn test_deposit_captured_to_fully_captured() {
        assert!(PaymentStateMachine::is_valid_transition(
            PaymentStatus::DepositCaptured,
            PaymentStatus::FullyCaptured
        ));
    }

    #[test]
    fn test_fully_captured_allows_deposit_refund() {
        assert!(PaymentStateMachine::is_valid_transition(
            PaymentStatus::FullyCaptured,
            PaymentStatus::DepositRefunded
        ));
    }

    #[test]
    fn test_fully_captured_cannot_fail() {
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::FullyCaptured,
            PaymentStatus::Failed
        ));
    }

    #[test]
    fn test_refunded_is_terminal() {
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::DepositRefunded,
            PaymentStatus::Failed
        ));
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::DepositRefunded,
            PaymentStatus::Pending
        ));
    }

    #[test]
    fn test_no_skip_to_fully_captured() {
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::Pending,
            PaymentStatus::FullyCaptured
        ));
    }

    #[test]
    fn test_failed_is_terminal() {
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::Failed,
            PaymentStatus::DepositCaptured
        ));
    }

    #[test]
    fn test_cancelled_accepts_late_failure() {
        // A failure event that arrives after the hold was released still
        // records the decline; cancelled is terminal for everything else.
        assert!(PaymentStateMachine::is_valid_transition(
            PaymentStatus::Cancelled,
            PaymentStatus::Failed
        ));
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::Cancelled,
            PaymentStatus::Pending
        ));
        assert!(!PaymentStateMachine::is_valid_transition(
            PaymentStatus::Cancelled,
            PaymentStatus::DepositCaptured
        ));
    }

    #[test]
    fn test_capture_deposit_guard() {
        assert!(PaymentStateMachine::can_capture_deposit(PaymentStatus::Pending));
        assert!(!PaymentStateMachine::can_capture_deposit(
            PaymentStatus::DepositCaptured
        ));
        assert!(!PaymentStateMachine::can_capture_deposit(PaymentStatus::Failed));
    }

    #[test]
    fn test_capture_remaining_guard_tolerates_fully_captured() {
        assert!(PaymentStateMachine::can_capture_remaining(
            PaymentStatus::DepositCaptured
        ));
        assert!(PaymentStateMachine::can_capture_remaining(
            PaymentStatus::FullyCaptured
        ));
        assert!(!PaymentStateMachine::can_capture_remaining(
            PaymentStatus::Pending
        ));
    }

    #[test]
    fn test_refund_guard_rejects_pending() {
        assert!(!PaymentStateMachine::can_refund_deposit(PaymentStatus::Pending));
        assert!(PaymentStateMachine::can_refund_deposit(
            PaymentStatus::DepositCaptured
        ));
        assert!(PaymentStateMachine::can_refund_deposit(
            PaymentStatus::FullyCaptured
        ));
    }

    #[test]
    fn test_cancel_authorization_guard() {
        assert!(PaymentStateMachine::can_cancel_authorization(
            PaymentStatus::Pending
        ));
        assert!(PaymentStateMachine::can_cancel_authorization(
            PaymentStatus::DepositCaptured
        ));
        assert!(!PaymentStateMachine::can_cancel_authorization(
            PaymentStatus::FullyCaptured
        ));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
        prop_oneof![
            Just(PaymentStatus::Pending),
            Just(PaymentStatus::DepositCaptured),
            Just(PaymentStatus::FullyCaptured),
            Just(PaymentStatus::DepositRefunded),
            Just(PaymentStatus::Cancelled),
            Just(PaymentStatus::Failed),
        ]
    }

    /// Property: same-status transitions are always valid (idempotent)
    #[test]
    fn prop_same_status_is_valid() {
        proptest!(|(status in payment_status_strategy())| {
            prop_assert!(PaymentStateMachine::is_valid_transition(status, status));
        });
    }

    /// Property: Failed is reachable from exactly the non-terminal-success
    /// states (Failed itself counts via idempotence)
    #[test]
    fn prop_failed_reachable_unless_terminal_success() {
        proptest!(|(status in payment_status_strategy())| {
            prop_assert_eq!(
                PaymentStateMachine::is_valid_transition(status, PaymentStatus::Failed),
                !PaymentStateMachine::is_terminal_success(status)
            );
        });
    }

    /// Property: every guard predicate implies a valid target transition
    #[test]
    fn prop_guards_imply_valid_transitions() {
        proptest!(|(status in payment_status_strategy())| {
            if PaymentStateMachine::can_capture_deposit(status) {
                prop_assert!(PaymentStateMachine::is_valid_transition(
                    status,
                    PaymentStatus::DepositCaptured
                ));
            }
            if PaymentStateMachine::can_capture_remaining(status) {
                prop_assert!(PaymentStateMachine::is_valid_transition(
                    status,
                    PaymentStatus::FullyCaptured
                ));
            }
            if PaymentStateMachine::can_refund_deposit(status) {
                prop_assert!(PaymentStateMachine::is_valid_transition(
                    status,
                    PaymentStatus::DepositRefunded
                ));
            }
            if PaymentStateMachine::can_cancel_authorization(status) {
                prop_assert!(PaymentStateMachine::is_valid_transition(
                    status,
                    PaymentStatus::Cancelled
                ));
            }
        });
    }
}
