//! In-memory TokenLedger with idempotency-key semantics.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::billing::{LedgerCredit, TokenWalletTransaction};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, WalletId};
use crate::ports::TokenLedger;

#[derive(Default)]
struct LedgerState {
    entries: Vec<TokenWalletTransaction>,
    balances: HashMap<WalletId, i64>,
}

/// Ledger that keeps entries and balances in memory.
///
/// A credit repeated with the same idempotency key returns the first entry.
#[derive(Default)]
pub struct InMemoryTokenLedger {
    state: RwLock<LedgerState>,
    calls: AtomicU32,
    fail: AtomicBool,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every credit until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of `record_transaction` calls, including rejected and replayed ones.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn balance(&self, wallet_id: &WalletId) -> i64 {
        self.state.read().await.balances.get(wallet_id).copied().unwrap_or(0)
    }

    pub async fn entries(&self) -> Vec<TokenWalletTransaction> {
        self.state.read().await.entries.clone()
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokenLedger {
    async fn record_transaction(
        &self,
        credit: &LedgerCredit,
    ) -> Result<TokenWalletTransaction, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(DomainError::new(ErrorCode::LedgerRejected, "ledger unavailable"));
        }

        let amount: i64 = credit.amount.parse().map_err(|_| {
            DomainError::validation("amount", format!("'{}' is not an integer", credit.amount))
        })?;

        let mut state = self.state.write().await;
        if let Some(existing) = state
            .entries
            .iter()
            .find(|entry| entry.idempotency_key == credit.idempotency_key)
        {
            return Ok(existing.clone());
        }

        let balance = state.balances.entry(credit.wallet_id.clone()).or_insert(0);
        *balance += amount;
        let entry = TokenWalletTransaction {
            transaction_id: Uuid::new_v4().to_string(),
            wallet_id: credit.wallet_id.clone(),
            transaction_type: credit.transaction_type,
            amount: credit.amount.clone(),
            balance_after_txn: balance.to_string(),
            recorded_by_user_id: credit.recorded_by_user_id.clone(),
            related_entity_id: Some(credit.related_entity_id.to_string()),
            related_entity_type: Some(credit.related_entity_type.clone()),
            idempotency_key: credit.idempotency_key.clone(),
            notes: Some(credit.notes.clone()),
            timestamp: Timestamp::now(),
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PaymentTransactionId, UserId};
    use serde_json::json;

    fn credit(key: &str, tokens: i64) -> LedgerCredit {
        LedgerCredit::purchase(
            WalletId::new("wallet_1").unwrap(),
            tokens,
            UserId::new("user_1").unwrap(),
            key,
            PaymentTransactionId::new("ptxn_1").unwrap(),
            json!({}),
        )
    }

    #[tokio::test]
    async fn same_idempotency_key_credits_once() {
        let ledger = InMemoryTokenLedger::new();

        let first = ledger.record_transaction(&credit("evt_1", 100)).await.unwrap();
        let second = ledger.record_transaction(&credit("evt_1", 100)).await.unwrap();

        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(ledger.balance(&WalletId::new("wallet_1").unwrap()).await, 100);
        assert_eq!(ledger.call_count(), 2);
    }

    #[tokio::test]
    async fn distinct_keys_accumulate_balance() {
        let ledger = InMemoryTokenLedger::new();

        ledger.record_transaction(&credit("evt_1", 100)).await.unwrap();
        let entry = ledger.record_transaction(&credit("evt_2", 50)).await.unwrap();

        assert_eq!(entry.balance_after_txn, "150");
    }

    #[tokio::test]
    async fn failing_ledger_rejects_without_recording() {
        let ledger = InMemoryTokenLedger::new();
        ledger.set_failing(true);

        let result = ledger.record_transaction(&credit("evt_1", 100)).await;

        assert_eq!(result.unwrap_err().code, ErrorCode::LedgerRejected);
        assert!(ledger.entries().await.is_empty());
    }
}
