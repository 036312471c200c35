//! PaymentTransactionRepository port - durable saga state for gateway events.
//!
//! Each payment transaction is the checkpoint of one reconciliation saga.
//! The store enforces one non-failed row per
//! `(payment_gateway_id, gateway_transaction_id)`, which is what makes
//! concurrent deliveries of the same invoice safe.

use async_trait::async_trait;

use crate::domain::billing::{
    CreateOutcome, FailureRecordOutcome, NewPaymentTransaction, PaymentTransaction,
    StatusTransition, TransitionOutcome,
};
use crate::domain::foundation::{DomainError, PaymentTransactionId};

#[async_trait]
pub trait PaymentTransactionRepository: Send + Sync {
    /// Find a transaction by internal id.
    async fn find_by_id(
        &self,
        id: &PaymentTransactionId,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Find a `COMPLETED` transaction for the given gateway id.
    async fn find_terminal(
        &self,
        payment_gateway_id: &str,
        gateway_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Insert a new transaction.
    ///
    /// Returns `AlreadyExists` when a non-failed row holds the same gateway id.
    async fn create(&self, transaction: NewPaymentTransaction) -> Result<CreateOutcome, DomainError>;

    /// Apply a status change, scoped by the transition's expected prior statuses.
    async fn transition_status(
        &self,
        id: &PaymentTransactionId,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, DomainError>;

    /// Record a failed payment for a gateway id.
    ///
    /// Updates an earlier `FAILED` row in place, or inserts one. Rows in any
    /// other status belong to another run and come back untouched as
    /// `AlreadyCompleted` or `InFlight`.
    async fn record_failure(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<FailureRecordOutcome, DomainError>;
}
