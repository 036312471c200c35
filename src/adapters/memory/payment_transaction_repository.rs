//! In-memory PaymentTransactionRepository.
//!
//! Mirrors the datastore's rules: the partial unique key on gateway ids,
//! scoped status updates, and failure upserts. Used by tests and by local
//! runs without a database.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::domain::billing::{
    CreateOutcome, FailureRecordOutcome, NewPaymentTransaction, PaymentStatus,
    PaymentTransaction, StatusTransition, TransitionOutcome,
};
use crate::domain::foundation::{DomainError, PaymentTransactionId, Timestamp};
use crate::ports::PaymentTransactionRepository;

/// In-memory payment transaction store with failure injection.
#[derive(Default)]
pub struct InMemoryPaymentTransactionRepository {
    rows: RwLock<Vec<PaymentTransaction>>,
    failing_targets: RwLock<HashSet<PaymentStatus>>,
    fail_create: RwLock<bool>,
}

impl InMemoryPaymentTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row as-is, bypassing uniqueness checks.
    pub async fn seed(&self, transaction: PaymentTransaction) {
        self.rows.write().await.push(transaction);
    }

    /// Makes every transition into `status` fail with a database error.
    pub async fn fail_transitions_to(&self, status: PaymentStatus) {
        self.failing_targets.write().await.insert(status);
    }

    /// Makes every insert and failure upsert fail with a database error.
    pub async fn fail_creates(&self) {
        *self.fail_create.write().await = true;
    }

    pub async fn get(&self, id: &PaymentTransactionId) -> Option<PaymentTransaction> {
        self.rows.read().await.iter().find(|row| &row.id == id).cloned()
    }

    pub async fn all(&self) -> Vec<PaymentTransaction> {
        self.rows.read().await.clone()
    }

    /// Rows recorded for a gateway transaction id, oldest first.
    pub async fn for_gateway_transaction(&self, gateway_transaction_id: &str) -> Vec<PaymentTransaction> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|row| row.gateway_transaction_id.as_deref() == Some(gateway_transaction_id))
            .cloned()
            .collect()
    }
}

fn holds_unique_key(row: &PaymentTransaction, gateway_id: &str, gateway_transaction_id: &str) -> bool {
    row.status != PaymentStatus::Failed
        && row.payment_gateway_id == gateway_id
        && row.gateway_transaction_id.as_deref() == Some(gateway_transaction_id)
}

#[async_trait]
impl PaymentTransactionRepository for InMemoryPaymentTransactionRepository {
    async fn find_by_id(
        &self,
        id: &PaymentTransactionId,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self.get(id).await)
    }

    async fn find_terminal(
        &self,
        payment_gateway_id: &str,
        gateway_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|row| {
                row.status.is_terminal_success()
                    && holds_unique_key(row, payment_gateway_id, gateway_transaction_id)
            })
            .cloned())
    }

    async fn create(&self, transaction: NewPaymentTransaction) -> Result<CreateOutcome, DomainError> {
        if *self.fail_create.read().await {
            return Err(DomainError::database("insert into payment_transactions failed"));
        }

        let mut rows = self.rows.write().await;
        if transaction.status != PaymentStatus::Failed {
            if let Some(gateway_tx) = transaction.gateway_transaction_id.as_deref() {
                if rows
                    .iter()
                    .any(|row| holds_unique_key(row, &transaction.payment_gateway_id, gateway_tx))
                {
                    return Ok(CreateOutcome::AlreadyExists);
                }
            }
        }

        let row = transaction.into_transaction(PaymentTransactionId::generate(), Timestamp::now());
        rows.push(row.clone());
        Ok(CreateOutcome::Created(row))
    }

    async fn transition_status(
        &self,
        id: &PaymentTransactionId,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, DomainError> {
        if self.failing_targets.read().await.contains(&transition.to) {
            return Err(DomainError::database(format!(
                "update payment_transactions to {} failed",
                transition.to
            )));
        }

        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|row| &row.id == id) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if !transition.permits(row.status) {
            return Ok(TransitionOutcome::Conflict { current: row.status });
        }

        row.apply(&transition, Timestamp::now())?;
        Ok(TransitionOutcome::Updated(row.clone()))
    }

    async fn record_failure(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<FailureRecordOutcome, DomainError> {
        if *self.fail_create.read().await {
            return Err(DomainError::database("upsert into payment_transactions failed"));
        }

        let now = Timestamp::now();
        let mut rows = self.rows.write().await;

        let gateway_tx = transaction.gateway_transaction_id.clone();
        // A live row takes precedence over earlier failure records.
        let existing = gateway_tx.as_deref().and_then(|gateway_tx| {
            rows.iter()
                .enumerate()
                .filter(|(_, row)| {
                    row.payment_gateway_id == transaction.payment_gateway_id
                        && row.gateway_transaction_id.as_deref() == Some(gateway_tx)
                })
                .max_by_key(|(_, row)| (row.status != PaymentStatus::Failed, row.updated_at))
                .map(|(index, _)| index)
        });

        if let Some(index) = existing {
            let row = &mut rows[index];
            if let Some(untouched) = FailureRecordOutcome::guard(row) {
                return Ok(untouched);
            }
            for (key, value) in transaction.metadata {
                row.metadata.insert(key, value);
            }
            if transaction.amount_requested_fiat.is_some() {
                row.amount_requested_fiat = transaction.amount_requested_fiat;
                row.currency = transaction.currency;
            }
            row.updated_at = now;
            return Ok(FailureRecordOutcome::Recorded(row.clone()));
        }

        let mut transaction = transaction;
        transaction.status = PaymentStatus::Failed;
        let row = transaction.into_transaction(PaymentTransactionId::generate(), now);
        rows.push(row.clone());
        Ok(FailureRecordOutcome::Recorded(row))
    }
}
