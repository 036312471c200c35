//! Billing handlers.
//!
//! Reconciliation of Stripe payment events against the token ledger:
//!
//! ## Event handlers
//! - `checkout.session.completed`: finalize a pending purchase and credit tokens
//! - `checkout.session.async_payment_failed` / `.expired`, `payment_intent.payment_failed`:
//!   close a pending purchase as failed
//! - `invoice.payment_succeeded`: record a renewal and credit tokens
//! - `invoice.payment_failed`: record the failed renewal attempt
//! - `customer.subscription.updated` / `.deleted`: mirror subscription state
//!
//! ## Commands
//! - Processing a raw webhook delivery (verify, parse, dispatch)

mod checkout_payment_failed;
mod checkout_session_completed;
mod dispatcher;
mod invoice_payment_failed;
mod invoice_payment_succeeded;
mod plan_resolver;
mod process_webhook;
mod subscription_lifecycle;
mod subscription_sync;

use std::sync::Arc;

use crate::ports::{
    PaymentGateway, PaymentTransactionRepository, PlanCatalog, TokenLedger,
    UserSubscriptionRepository, WalletDirectory,
};

// Event handlers
pub use checkout_payment_failed::CheckoutPaymentFailedHandler;
pub use checkout_session_completed::CheckoutSessionCompletedHandler;
pub use invoice_payment_failed::InvoicePaymentFailedHandler;
pub use invoice_payment_succeeded::InvoicePaymentSucceededHandler;
pub use subscription_lifecycle::SubscriptionLifecycleHandler;

// Commands
pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler};

// Shared services
pub use dispatcher::{BillingEventHandler, WebhookDispatcher};
pub use plan_resolver::{PlanResolver, SubscriptionPlanSource};
pub use subscription_sync::{SubscriptionSynchronizer, SyncOutcome};

/// The ports every billing handler draws from.
#[derive(Clone)]
pub struct BillingPorts {
    pub transactions: Arc<dyn PaymentTransactionRepository>,
    pub ledger: Arc<dyn TokenLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub catalog: Arc<dyn PlanCatalog>,
    pub subscriptions: Arc<dyn UserSubscriptionRepository>,
    pub wallets: Arc<dyn WalletDirectory>,
}

impl BillingPorts {
    pub fn plan_resolver(&self) -> Arc<PlanResolver> {
        Arc::new(PlanResolver::new(self.catalog.clone(), self.gateway.clone()))
    }

    pub fn synchronizer(&self) -> Arc<SubscriptionSynchronizer> {
        Arc::new(SubscriptionSynchronizer::new(
            self.subscriptions.clone(),
            self.catalog.clone(),
        ))
    }

    /// Dispatcher with every billing event handler registered.
    pub fn dispatcher(&self) -> WebhookDispatcher {
        WebhookDispatcher::new()
            .register(Arc::new(CheckoutSessionCompletedHandler::new(self)))
            .register(Arc::new(CheckoutPaymentFailedHandler::new(self)))
            .register(Arc::new(InvoicePaymentSucceededHandler::new(self)))
            .register(Arc::new(InvoicePaymentFailedHandler::new(self)))
            .register(Arc::new(SubscriptionLifecycleHandler::new(self)))
    }
}
