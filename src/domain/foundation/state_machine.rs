//! State machine trait for status enums.
//!
//! Used by the payment transaction lifecycle so that every status write can be
//! checked against the allowed edges before it reaches the datastore.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors define valid state transitions and get validated
/// transition methods for free.
///
/// # Example
///
/// ```ignore
/// let next = PaymentStatus::ProcessingRenewal.transition_to(PaymentStatus::Completed)?;
/// assert!(PaymentStatus::Failed.is_terminal());
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum RefundStatus {
        Requested,
        Approved,
        Paid,
        Rejected,
    }

    impl StateMachine for RefundStatus {
        fn can_transition_to(&self, target: &Self) -> bool {
            self.valid_transitions().contains(target)
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use RefundStatus::*;
            match self {
                Requested => vec![Approved, Rejected],
                Approved => vec![Paid],
                Paid | Rejected => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_transition() {
        let result = RefundStatus::Requested.transition_to(RefundStatus::Approved);
        assert_eq!(result, Ok(RefundStatus::Approved));
    }

    #[test]
    fn transition_to_fails_for_skipped_step() {
        let result = RefundStatus::Requested.transition_to(RefundStatus::Paid);
        match result {
            Err(ValidationError::InvalidFormat { field, reason }) => {
                assert_eq!(field, "state_transition");
                assert!(reason.contains("Requested"));
                assert!(reason.contains("Paid"));
            }
            other => panic!("Expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn is_terminal_follows_valid_transitions() {
        assert!(RefundStatus::Paid.is_terminal());
        assert!(RefundStatus::Rejected.is_terminal());
        assert!(!RefundStatus::Requested.is_terminal());
        assert!(!RefundStatus::Approved.is_terminal());
    }
}
