//! Token ledger request and entry types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{PaymentTransactionId, Timestamp, UserId, WalletId};

/// Entity type recorded on ledger entries created by this engine.
pub const PAYMENT_TRANSACTIONS_ENTITY: &str = "payment_transactions";

/// Ledger entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerTransactionType {
    CreditPurchase,
}

impl LedgerTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerTransactionType::CreditPurchase => "CREDIT_PURCHASE",
        }
    }
}

/// A credit request sent to the token ledger.
///
/// The ledger applies it at most once per `idempotency_key`.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCredit {
    pub wallet_id: WalletId,
    pub transaction_type: LedgerTransactionType,
    /// String-encoded integer.
    pub amount: String,
    pub recorded_by_user_id: UserId,
    pub idempotency_key: String,
    pub related_entity_id: PaymentTransactionId,
    pub related_entity_type: String,
    pub notes: Value,
}

impl LedgerCredit {
    /// Purchase credit tied to a payment transaction.
    pub fn purchase(
        wallet_id: WalletId,
        tokens: i64,
        recorded_by_user_id: UserId,
        idempotency_key: impl Into<String>,
        payment_transaction_id: PaymentTransactionId,
        notes: Value,
    ) -> Self {
        Self {
            wallet_id,
            transaction_type: LedgerTransactionType::CreditPurchase,
            amount: tokens.to_string(),
            recorded_by_user_id,
            idempotency_key: idempotency_key.into(),
            related_entity_id: payment_transaction_id,
            related_entity_type: PAYMENT_TRANSACTIONS_ENTITY.to_string(),
            notes,
        }
    }
}

/// An appended ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenWalletTransaction {
    pub transaction_id: String,
    pub wallet_id: WalletId,
    #[serde(rename = "type")]
    pub transaction_type: LedgerTransactionType,
    pub amount: String,
    pub balance_after_txn: String,
    pub recorded_by_user_id: UserId,
    pub related_entity_id: Option<String>,
    pub related_entity_type: Option<String>,
    pub idempotency_key: String,
    pub notes: Option<Value>,
    pub timestamp: Timestamp,
}
