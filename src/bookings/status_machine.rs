use crate::bookings::BookingStatus;

/// Service for managing booking status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - Pending → Confirmed, Completed, Cancelled, NoShow
    /// - Confirmed → Completed, Cancelled, NoShow
    /// - Completed, Cancelled, NoShow → (terminal, no transitions except to itself)
    /// - Any status → Same status (idempotent)
    ///
    /// Completion from Pending is allowed because the balance can be
    /// captured without the deposit-confirmation step having run; the
    /// service layer still requires the payment to be fully captured first.
    pub fn is_valid_transition(from: BookingStatus, to: BookingStatus) -> bool {
        // Same status is always valid (idempotent)
        if from == to {
            return true;
        }

        match (from, to) {
            // From Pending
            (BookingStatus::Pending, BookingStatus::Confirmed) => true,
            (BookingStatus::Pending, BookingStatus::Completed) => true,
            (BookingStatus::Pending, BookingStatus::Cancelled) => true,
            (BookingStatus::Pending, BookingStatus::NoShow) => true,

            // From Confirmed
            (BookingStatus::Confirmed, BookingStatus::Completed) => true,
            (BookingStatus::Confirmed, BookingStatus::Cancelled) => true,
            (BookingStatus::Confirmed, BookingStatus::NoShow) => true,

            // Terminal states
            (BookingStatus::Completed, _) => false,
            (BookingStatus::Cancelled, _) => false,
            (BookingStatus::NoShow, _) => false,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    ///
    /// # Returns
    /// `Ok(to)` if the transition is valid, `Err(message)` otherwise
    pub fn transition(from: BookingStatus, to: BookingStatus) -> Result<BookingStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid status transition from {} to {}", from, to))
        }
    }

    /// True once a booking can no longer change state
    pub fn is_terminal(status: BookingStatus) -> bool {
        matches!(
            status,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_confirmed() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Pending,
            BookingStatus::Confirmed
        ));
    }

    #[test]
    fn test_pending_to_cancelled() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Pending,
            BookingStatus::Cancelled
        ));
    }

    #[test]
    fn test_pending_to_completed() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Pending,
            BookingStatus::Completed
        ));
    }

    #[test]
    fn test_confirmed_to_completed() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Confirmed,
            BookingStatus::Completed
        ));
    }

    #[test]
    fn test_confirmed_to_no_show() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Confirmed,
            BookingStatus::NoShow
        ));
    }

    #[test]
    fn test_completed_is_terminal() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Completed,
            BookingStatus::Cancelled
        ));
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Completed,
            BookingStatus::Pending
        ));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Cancelled,
            BookingStatus::Confirmed
        ));
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Cancelled,
            BookingStatus::Completed
        ));
    }

    #[test]
    fn test_no_show_is_terminal() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::NoShow,
            BookingStatus::Cancelled
        ));
    }

    #[test]
    fn test_no_backward_transition() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Confirmed,
            BookingStatus::Pending
        ));
    }

    #[test]
    fn test_transition_valid() {
        let result = StatusMachine::transition(BookingStatus::Pending, BookingStatus::Confirmed);
        assert_eq!(result, Ok(BookingStatus::Confirmed));
    }

    #[test]
    fn test_transition_invalid() {
        let result = StatusMachine::transition(BookingStatus::Cancelled, BookingStatus::Confirmed);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid status transition"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn booking_status_strategy() -> impl Strategy<Value = BookingStatus> {
        prop_oneof![
            Just(BookingStatus::Pending),
            Just(BookingStatus::Confirmed),
            Just(BookingStatus::Completed),
            Just(BookingStatus::Cancelled),
            Just(BookingStatus::NoShow),
        ]
    }

    /// Property: same-status transitions are always valid (idempotent)
    #[test]
    fn prop_same_status_is_valid() {
        proptest!(|(status in booking_status_strategy())| {
            prop_assert!(StatusMachine::is_valid_transition(status, status));
        });
    }

    /// Property: terminal states admit no outgoing transitions
    #[test]
    fn prop_terminal_states_absorb() {
        proptest!(|(
            from in booking_status_strategy(),
            to in booking_status_strategy()
        )| {
            if StatusMachine::is_terminal(from) && from != to {
                prop_assert!(!StatusMachine::is_valid_transition(from, to));
            }
        });
    }

    /// Property: cancellation is reachable from every non-terminal state
    #[test]
    fn prop_can_always_cancel_before_terminal() {
        proptest!(|(from in booking_status_strategy())| {
            if !StatusMachine::is_terminal(from) {
                prop_assert!(StatusMachine::is_valid_transition(from, BookingStatus::Cancelled));
            }
        });
    }

    /// Property: transition() agrees with is_valid_transition()
    #[test]
    fn prop_transition_consistency() {
        proptest!(|(
            from in booking_status_strategy(),
            to in booking_status_strategy()
        )| {
            let is_valid = StatusMachine::is_valid_transition(from, to);
            let result = StatusMachine::transition(from, to);
            if is_valid {
                prop_assert_eq!(result, Ok(to));
            } else {
                prop_assert!(result.is_err());
            }
        });
    }
}
