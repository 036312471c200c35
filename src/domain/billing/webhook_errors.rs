//! Webhook transport and verification errors.
//!
//! These are raised before any billing handler runs, with HTTP status
//! mapping and retryability semantics for the gateway.

use axum::http::StatusCode;
use thiserror::Error;

use super::ReconcileError;

/// Errors that occur while accepting a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The Stripe-Signature header was not sent.
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Test-mode event delivered to a live deployment.
    #[error("Test mode events are not accepted")]
    LivemodeRequired,
}

impl WebhookError {
    /// Returns true if Stripe should retry delivering this webhook.
    ///
    /// A bad signature or payload never becomes valid on redelivery.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange => StatusCode::UNAUTHORIZED,

            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::LivemodeRequired => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<WebhookError> for ReconcileError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::ParseError(reason) => ReconcileError::MalformedEvent(reason),
            other => ReconcileError::VerificationFailed(other.to_string()),
        }
    }
}
