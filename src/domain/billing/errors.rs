//! Reconciliation error taxonomy.
//!
//! Every failure a billing event handler can report maps to one
//! [`ReconcileErrorCode`]. The code name is what callers see at the front of
//! `PaymentConfirmation::error`, so it must stay stable.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors raised while reconciling a gateway event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("Webhook verification failed: {0}")]
    VerificationFailed(String),

    #[error("Event payload could not be interpreted: {0}")]
    MalformedEvent(String),

    #[error("{0}")]
    TransactionNotFound(String),

    #[error("User not found for customer {customer_id}")]
    UserNotFound { customer_id: String },

    #[error("Wallet not found for user {user_id}")]
    WalletNotFound { user_id: String },

    #[error("Subscription plan details not found for price ID {price_id}")]
    PlanNotFound { price_id: String },

    #[error("Gateway lookup failed: {0}")]
    GatewayLookupFailed(String),

    #[error("Failed to create payment record: {0}")]
    RecordCreationFailed(String),

    #[error("Gateway transaction {0} is already being processed")]
    AlreadyProcessing(String),

    #[error("Token award failed after payment: {0}")]
    LedgerError(String),

    #[error("Failed to update final payment status: {0}")]
    FinalizationFailed(String),

    #[error("Subscription sync failed: {0}")]
    SyncError(String),

    #[error("Datastore error: {0}")]
    Storage(String),
}

/// Stable, serializable name of a [`ReconcileError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileErrorCode {
    VerificationFailed,
    MalformedEvent,
    TransactionNotFound,
    UserNotFound,
    WalletNotFound,
    PlanNotFound,
    GatewayLookupFailed,
    RecordCreationFailed,
    AlreadyProcessing,
    LedgerError,
    FinalizationFailed,
    SyncError,
    Storage,
}

impl ReconcileErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerificationFailed => "VerificationFailed",
            Self::MalformedEvent => "MalformedEvent",
            Self::TransactionNotFound => "TransactionNotFound",
            Self::UserNotFound => "UserNotFound",
            Self::WalletNotFound => "WalletNotFound",
            Self::PlanNotFound => "PlanNotFound",
            Self::GatewayLookupFailed => "GatewayLookupFailed",
            Self::RecordCreationFailed => "RecordCreationFailed",
            Self::AlreadyProcessing => "AlreadyProcessing",
            Self::LedgerError => "LedgerError",
            Self::FinalizationFailed => "FinalizationFailed",
            Self::SyncError => "SyncError",
            Self::Storage => "Storage",
        }
    }

    /// True when a later redelivery of the same event can succeed without
    /// anyone repairing data first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyProcessing
                | Self::GatewayLookupFailed
                | Self::RecordCreationFailed
                | Self::Storage
        )
    }

    /// HTTP status returned to the gateway for a failed event.
    ///
    /// Any non-2xx makes the gateway redeliver; 409 marks the delivery as
    /// deferred rather than broken.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::VerificationFailed => StatusCode::UNAUTHORIZED,
            Self::MalformedEvent => StatusCode::BAD_REQUEST,
            Self::AlreadyProcessing => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ReconcileErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ReconcileError {
    pub fn code(&self) -> ReconcileErrorCode {
        match self {
            Self::VerificationFailed(_) => ReconcileErrorCode::VerificationFailed,
            Self::MalformedEvent(_) => ReconcileErrorCode::MalformedEvent,
            Self::TransactionNotFound(_) => ReconcileErrorCode::TransactionNotFound,
            Self::UserNotFound { .. } => ReconcileErrorCode::UserNotFound,
            Self::WalletNotFound { .. } => ReconcileErrorCode::WalletNotFound,
            Self::PlanNotFound { .. } => ReconcileErrorCode::PlanNotFound,
            Self::GatewayLookupFailed(_) => ReconcileErrorCode::GatewayLookupFailed,
            Self::RecordCreationFailed(_) => ReconcileErrorCode::RecordCreationFailed,
            Self::AlreadyProcessing(_) => ReconcileErrorCode::AlreadyProcessing,
            Self::LedgerError(_) => ReconcileErrorCode::LedgerError,
            Self::FinalizationFailed(_) => ReconcileErrorCode::FinalizationFailed,
            Self::SyncError(_) => ReconcileErrorCode::SyncError,
            Self::Storage(_) => ReconcileErrorCode::Storage,
        }
    }

    /// Text carried in `PaymentConfirmation::error`: `"<Code>: <message>"`.
    pub fn describe(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        ReconcileError::Storage(err.to_string())
    }
}
