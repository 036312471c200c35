//! Payment transaction status and its lifecycle rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of a payment transaction.
///
/// `Completed` is the only terminal-success value. Rows written by older
/// code paths with the lowercase `succeeded` spelling are read back as
/// `Completed` and never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created, not yet processed.
    Pending,
    /// Subscription renewal in progress.
    ProcessingRenewal,
    /// Tokens awarded and the row finalized.
    Completed,
    /// Ledger credit failed after the row was created.
    TokenAwardFailed,
    /// Resolution failed before any credit was attempted.
    Failed,
}

impl PaymentStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::ProcessingRenewal => "PROCESSING_RENEWAL",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::TokenAwardFailed => "TOKEN_AWARD_FAILED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PROCESSING_RENEWAL" => Ok(PaymentStatus::ProcessingRenewal),
            "COMPLETED" | "succeeded" => Ok(PaymentStatus::Completed),
            "TOKEN_AWARD_FAILED" => Ok(PaymentStatus::TokenAwardFailed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }

    /// True only for the single terminal-success status.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    /// True when a replayed event must not trigger any further work.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::TokenAwardFailed | PaymentStatus::Failed
        )
    }

    /// Every status, in lifecycle order.
    pub fn all() -> [PaymentStatus; 5] {
        [
            PaymentStatus::Pending,
            PaymentStatus::ProcessingRenewal,
            PaymentStatus::Completed,
            PaymentStatus::TokenAwardFailed,
            PaymentStatus::Failed,
        ]
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![ProcessingRenewal, Completed, TokenAwardFailed, Failed],
            ProcessingRenewal => vec![Completed, TokenAwardFailed, Failed],
            // Checkout finalizes before crediting, so a ledger failure has to
            // be able to move a completed row.
            Completed => vec![TokenAwardFailed],
            TokenAwardFailed | Failed => vec![],
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ══════════════════════════════════════════════════════════════
    // Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_accepts_every_stored_value() {
        for status in PaymentStatus::all() {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn parse_maps_legacy_succeeded_to_completed() {
        assert_eq!(PaymentStatus::parse("succeeded").unwrap(), PaymentStatus::Completed);
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert!(PaymentStatus::parse("DONE").is_err());
        assert!(PaymentStatus::parse("completed").is_err());
    }

    #[test]
    fn serializes_as_storage_string() {
        let json = serde_json::to_string(&PaymentStatus::TokenAwardFailed).unwrap();
        assert_eq!(json, "\"TOKEN_AWARD_FAILED\"");
    }

    // ══════════════════════════════════════════════════════════════
    // Transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn renewal_path_reaches_completed() {
        let status = PaymentStatus::Pending
            .transition_to(PaymentStatus::ProcessingRenewal)
            .and_then(|s| s.transition_to(PaymentStatus::Completed));
        assert_eq!(status, Ok(PaymentStatus::Completed));
    }

    #[test]
    fn completed_can_only_fall_back_to_token_award_failed() {
        assert_eq!(
            PaymentStatus::Completed.valid_transitions(),
            vec![PaymentStatus::TokenAwardFailed]
        );
        assert!(PaymentStatus::Completed
            .transition_to(PaymentStatus::Pending)
            .is_err());
    }

    #[test]
    fn failure_statuses_are_terminal() {
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::TokenAwardFailed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn only_completed_is_terminal_success() {
        let successes: Vec<_> = PaymentStatus::all()
            .into_iter()
            .filter(|s| s.is_terminal_success())
            .collect();
        assert_eq!(successes, vec![PaymentStatus::Completed]);
    }

    #[test]
    fn settled_statuses_cover_every_replay_stop() {
        assert!(PaymentStatus::Completed.is_settled());
        assert!(PaymentStatus::Failed.is_settled());
        assert!(PaymentStatus::TokenAwardFailed.is_settled());
        assert!(!PaymentStatus::Pending.is_settled());
        assert!(!PaymentStatus::ProcessingRenewal.is_settled());
    }

    fn any_status() -> impl Strategy<Value = PaymentStatus> {
        prop::sample::select(PaymentStatus::all().to_vec())
    }

    proptest! {
        #[test]
        fn no_transition_leads_back_to_pending(from in any_status()) {
            prop_assert!(!from.can_transition_to(&PaymentStatus::Pending));
        }

        #[test]
        fn transition_to_agrees_with_can_transition_to(from in any_status(), to in any_status()) {
            prop_assert_eq!(from.transition_to(to).is_ok(), from.can_transition_to(&to));
        }

        #[test]
        fn storage_string_roundtrips(status in any_status()) {
            prop_assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
