//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the reconciliation handlers and the outside world. Adapters implement
//! these ports.
//!
//! ## Gateway Ports
//!
//! - `PaymentGateway` - Read-only lookups against the payment processor
//!
//! ## Persistence Ports
//!
//! - `PaymentTransactionRepository` - Saga state per gateway transaction
//! - `TokenLedger` - Idempotent wallet credits
//! - `PlanCatalog` - Price to plan mapping
//! - `UserSubscriptionRepository` - Internal subscription mirror
//! - `WalletDirectory` - User to wallet mapping

mod payment_gateway;
mod payment_transaction_repository;
mod plan_catalog;
mod token_ledger;
mod user_subscription_repository;
mod wallet_directory;

pub use payment_gateway::{PaymentGateway, PaymentGatewayError, PaymentGatewayErrorCode};
pub use payment_transaction_repository::PaymentTransactionRepository;
pub use plan_catalog::PlanCatalog;
pub use token_ledger::TokenLedger;
pub use user_subscription_repository::UserSubscriptionRepository;
pub use wallet_directory::WalletDirectory;
