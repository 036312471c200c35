//! PostgreSQL adapters - Database implementations for persistence ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresPaymentTransactionRepository` - Saga rows with the gateway unique key
//! - `PostgresTokenLedger` - Credits through the `record_token_transaction` procedure
//! - `PostgresPlanCatalog` - `subscription_plans` lookups
//! - `PostgresUserSubscriptionRepository` - `user_subscriptions` mirror
//! - `PostgresWalletDirectory` - `token_wallets` lookups

mod payment_transaction_repository;
mod plan_catalog;
mod token_ledger;
mod user_subscription_repository;
mod wallet_directory;

pub use payment_transaction_repository::PostgresPaymentTransactionRepository;
pub use plan_catalog::PostgresPlanCatalog;
pub use token_ledger::PostgresTokenLedger;
pub use user_subscription_repository::PostgresUserSubscriptionRepository;
pub use wallet_directory::PostgresWalletDirectory;

use crate::domain::foundation::{DomainError, ErrorCode};

fn database_error(action: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, err))
}

/// Maps a stored value that failed domain validation.
fn corrupt_row(field: &str, reason: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid {}: {}", field, reason))
}
