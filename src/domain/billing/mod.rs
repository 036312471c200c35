//! Billing domain module.
//!
//! Payment transactions, their status machine, and the typed gateway
//! events the reconciliation handlers consume.
//!
//! # Module Structure
//!
//! - `payment_status` - PaymentStatus state machine
//! - `payment_transaction` - Payment transaction record and scoped updates
//! - `confirmation` - PaymentConfirmation result returned by every handler
//! - `errors` - Reconciliation error taxonomy
//! - `plan` - Subscription plan reference data
//! - `subscription` - Gateway and internal subscription views
//! - `ledger` - Token ledger credit requests
//! - `token_source` - Resolver chain for renewal token counts
//! - `stripe_event` / `stripe_objects` - Webhook envelope and payload shapes
//! - `webhook_verifier` / `webhook_errors` - Signature verification

mod confirmation;
mod errors;
mod ledger;
mod payment_status;
mod payment_transaction;
mod plan;
mod stripe_event;
mod stripe_objects;
mod subscription;
mod token_source;
mod webhook_errors;
mod webhook_verifier;

pub use confirmation::PaymentConfirmation;
pub use errors::{ReconcileError, ReconcileErrorCode};
pub use ledger::{LedgerCredit, LedgerTransactionType, TokenWalletTransaction, PAYMENT_TRANSACTIONS_ENTITY};
pub use payment_status::PaymentStatus;
pub use payment_transaction::{
    CreateOutcome, FailureRecordOutcome, Metadata, NewPaymentTransaction, PaymentTransaction,
    StatusTransition, TransitionOutcome,
};
pub use plan::{PlanType, ResolvedPlan, SubscriptionPlan};
pub use stripe_event::{StripeEvent, StripeEventData, StripeEventType};
pub use stripe_objects::{
    CheckoutSessionObject, InvoiceLineItem, InvoiceLines, InvoiceObject, PaymentAttemptObject,
    PriceRef, SubscriptionItem, SubscriptionItems, SubscriptionObject, INTERNAL_PAYMENT_ID_KEY,
    TOKENS_TO_AWARD_KEY,
};
pub use subscription::{GatewayCheckoutSession, GatewaySubscription, SubscriptionState, UserSubscription};
pub use token_source::{
    InvoiceMetadataSource, LineItemMetadataSource, TokenAward, TokenSource, TokenSourceChain,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;
