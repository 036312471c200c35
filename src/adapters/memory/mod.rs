//! In-memory adapters.
//!
//! Deterministic implementations of every port, with switches for
//! injecting failures. Used by the test suites and for running the
//! service without a database.

mod payment_gateway;
mod payment_transaction_repository;
mod plan_catalog;
mod token_ledger;
mod user_subscription_repository;

pub use payment_gateway::InMemoryPaymentGateway;
pub use payment_transaction_repository::InMemoryPaymentTransactionRepository;
pub use plan_catalog::InMemoryPlanCatalog;
pub use token_ledger::InMemoryTokenLedger;
pub use user_subscription_repository::{InMemoryUserSubscriptionRepository, InMemoryWalletDirectory};
