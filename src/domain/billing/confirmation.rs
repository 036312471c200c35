//! PaymentConfirmation - the single result every billing event handler returns.

use serde::{Deserialize, Serialize};

use super::{ReconcileError, ReconcileErrorCode};

/// Outcome of reconciling one gateway event.
///
/// Serialized in camelCase; this shape is what callers log, alert and retry on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub success: bool,
    /// Internal payment transaction id, or the gateway event id when no row exists.
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_gateway_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_awarded: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Classification of `error`; not part of the wire shape.
    #[serde(skip)]
    pub error_code: Option<ReconcileErrorCode>,
}

impl PaymentConfirmation {
    /// Successful outcome.
    pub fn succeeded(transaction_id: impl Into<String>, tokens_awarded: i64) -> Self {
        Self {
            success: true,
            transaction_id: transaction_id.into(),
            payment_gateway_transaction_id: None,
            tokens_awarded: Some(tokens_awarded),
            error: None,
            message: None,
            error_code: None,
        }
    }

    /// Event acknowledged without any token movement.
    pub fn acknowledged(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: event_id.into(),
            payment_gateway_transaction_id: None,
            tokens_awarded: None,
            error: None,
            message: Some(message.into()),
            error_code: None,
        }
    }

    /// Failed outcome carrying the error's code and text.
    pub fn failed(transaction_id: impl Into<String>, err: &ReconcileError) -> Self {
        Self {
            success: false,
            transaction_id: transaction_id.into(),
            payment_gateway_transaction_id: None,
            tokens_awarded: None,
            error: Some(err.describe()),
            message: None,
            error_code: Some(err.code()),
        }
    }

    pub fn with_gateway_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.payment_gateway_transaction_id = Some(id.into());
        self
    }

    pub fn with_tokens(mut self, tokens: i64) -> Self {
        self.tokens_awarded = Some(tokens);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches an error to an otherwise successful outcome.
    ///
    /// Used when tokens were granted but bookkeeping afterwards failed.
    pub fn with_warning(mut self, code: ReconcileErrorCode, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.error_code = Some(code);
        self
    }
}
