//! TokenLedger port - the append-only ledger that owns wallet balances.

use async_trait::async_trait;

use crate::domain::billing::{LedgerCredit, TokenWalletTransaction};
use crate::domain::foundation::DomainError;

/// Records token movements against wallets.
///
/// Implementations must treat `idempotency_key` as a uniqueness key: a
/// repeated credit with the same key returns the original entry instead
/// of applying the amount twice.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn record_transaction(
        &self,
        credit: &LedgerCredit,
    ) -> Result<TokenWalletTransaction, DomainError>;
}
