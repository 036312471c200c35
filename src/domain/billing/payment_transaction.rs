//! Payment transaction record - one row per attempt to process a gateway event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PaymentStatus;
use crate::domain::foundation::{
    PaymentTransactionId, StateMachine, Timestamp, UserId, ValidationError, WalletId,
};

/// Free-form metadata stored alongside a payment transaction.
pub type Metadata = Map<String, Value>;

/// Durable record of one attempted payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentTransactionId,
    pub user_id: Option<UserId>,
    pub target_wallet_id: WalletId,
    pub payment_gateway_id: String,
    /// The gateway's session, invoice or event id. Unique per gateway.
    pub gateway_transaction_id: Option<String>,
    pub tokens_to_award: i64,
    pub status: PaymentStatus,
    pub amount_requested_fiat: Option<f64>,
    pub currency: Option<String>,
    pub metadata: Metadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PaymentTransaction {
    /// Applies a validated status change in memory.
    pub fn apply(&mut self, transition: &StatusTransition, now: Timestamp) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(transition.to)?;
        if let Some(gateway_id) = &transition.gateway_transaction_id {
            self.gateway_transaction_id = Some(gateway_id.clone());
        }
        for (key, value) in &transition.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        self.updated_at = now;
        Ok(())
    }

    /// Returns a metadata value as a string, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Data needed to insert a new payment transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentTransaction {
    pub user_id: Option<UserId>,
    pub target_wallet_id: WalletId,
    pub payment_gateway_id: String,
    pub gateway_transaction_id: Option<String>,
    pub tokens_to_award: i64,
    pub status: PaymentStatus,
    pub amount_requested_fiat: Option<f64>,
    pub currency: Option<String>,
    pub metadata: Metadata,
}

impl NewPaymentTransaction {
    /// Starts a new record for the given wallet and gateway.
    pub fn new(
        target_wallet_id: WalletId,
        payment_gateway_id: impl Into<String>,
        status: PaymentStatus,
    ) -> Self {
        Self {
            user_id: None,
            target_wallet_id,
            payment_gateway_id: payment_gateway_id.into(),
            gateway_transaction_id: None,
            tokens_to_award: 0,
            status,
            amount_requested_fiat: None,
            currency: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_gateway_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.gateway_transaction_id = Some(id.into());
        self
    }

    /// Sets the token count; negative counts are rejected.
    pub fn with_tokens(mut self, tokens: i64) -> Result<Self, ValidationError> {
        if tokens < 0 {
            return Err(ValidationError::negative("tokens_to_award", tokens));
        }
        self.tokens_to_award = tokens;
        Ok(self)
    }

    /// Sets the fiat amount from gateway minor units (cents).
    pub fn with_amount_minor(mut self, amount_minor: i64, currency: impl Into<String>) -> Self {
        self.amount_requested_fiat = Some(amount_minor as f64 / 100.0);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materializes the row as the store would persist it.
    pub fn into_transaction(self, id: PaymentTransactionId, now: Timestamp) -> PaymentTransaction {
        PaymentTransaction {
            id,
            user_id: self.user_id,
            target_wallet_id: self.target_wallet_id,
            payment_gateway_id: self.payment_gateway_id,
            gateway_transaction_id: self.gateway_transaction_id,
            tokens_to_award: self.tokens_to_award,
            status: self.status,
            amount_requested_fiat: self.amount_requested_fiat,
            currency: self.currency,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A status change scoped to one transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub to: PaymentStatus,
    /// When set, the update only applies if the current status is one of these.
    pub expected_prior: Option<Vec<PaymentStatus>>,
    pub gateway_transaction_id: Option<String>,
    /// Keys merged into the stored metadata.
    pub metadata: Metadata,
}

impl StatusTransition {
    pub fn to(status: PaymentStatus) -> Self {
        Self {
            to: status,
            expected_prior: None,
            gateway_transaction_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn from_any_of(mut self, prior: &[PaymentStatus]) -> Self {
        self.expected_prior = Some(prior.to_vec());
        self
    }

    pub fn with_gateway_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.gateway_transaction_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether a row currently in `current` may receive this update.
    pub fn permits(&self, current: PaymentStatus) -> bool {
        let prior_ok = self
            .expected_prior
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&current));
        prior_ok && current.can_transition_to(&self.to)
    }
}

/// Result of inserting a payment transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(PaymentTransaction),
    /// A row with the same gateway id already exists.
    AlreadyExists,
}

/// Result of a scoped status update.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Updated(PaymentTransaction),
    /// The row exists but its current status does not allow the update.
    Conflict { current: PaymentStatus },
    NotFound,
}

/// Result of recording a failed payment.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureRecordOutcome {
    Recorded(PaymentTransaction),
    /// A completed row already exists for the same gateway id and was left alone.
    AlreadyCompleted(PaymentTransaction),
    /// Another handler's run owns a live row for the same gateway id; it was left alone.
    InFlight(PaymentTransaction),
}

impl FailureRecordOutcome {
    /// Classifies an existing row that a failure notice would overwrite.
    ///
    /// Returns `None` only for an earlier failure record, which may be updated.
    pub fn guard(existing: &PaymentTransaction) -> Option<Self> {
        match existing.status {
            PaymentStatus::Failed => None,
            status if status.is_settled() => {
                Some(FailureRecordOutcome::AlreadyCompleted(existing.clone()))
            }
            _ => Some(FailureRecordOutcome::InFlight(existing.clone())),
        }
    }
}
