//! InvoicePaymentFailedHandler - records failed renewal attempts.
//!
//! No tokens move. The attempt is kept as a `FAILED` row keyed by invoice
//! id so a later successful retry of the same invoice can still claim it.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{BillingEventHandler, BillingPorts, PlanResolver, SubscriptionSynchronizer};
use crate::domain::billing::{
    FailureRecordOutcome, InvoiceObject, Metadata, NewPaymentTransaction, PaymentConfirmation,
    PaymentStatus, ReconcileError, ReconcileErrorCode, StripeEvent, StripeEventType,
};
use crate::domain::foundation::UserId;
use crate::ports::{PaymentTransactionRepository, UserSubscriptionRepository, WalletDirectory};

pub struct InvoicePaymentFailedHandler {
    transactions: Arc<dyn PaymentTransactionRepository>,
    subscriptions: Arc<dyn UserSubscriptionRepository>,
    wallets: Arc<dyn WalletDirectory>,
    plans: Arc<PlanResolver>,
    synchronizer: Arc<SubscriptionSynchronizer>,
    gateway_id: String,
}

impl InvoicePaymentFailedHandler {
    pub fn new(ports: &BillingPorts) -> Self {
        Self {
            transactions: ports.transactions.clone(),
            subscriptions: ports.subscriptions.clone(),
            wallets: ports.wallets.clone(),
            plans: ports.plan_resolver(),
            synchronizer: ports.synchronizer(),
            gateway_id: ports.gateway.gateway_id().to_string(),
        }
    }

    /// Pulls the subscription's current status (typically `past_due`).
    async fn sync_subscription(&self, subscription_id: &str, user_id: &UserId) -> Option<ReconcileError> {
        let result = match self.plans.fetch_subscription(subscription_id).await {
            Ok(subscription) => self
                .synchronizer
                .sync(&subscription, Some(user_id), None)
                .await
                .map(|_| ()),
            Err(e) => Err(ReconcileError::SyncError(e.to_string())),
        };

        match result {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(
                    stripe_subscription_id = %subscription_id,
                    error = %err,
                    "Could not sync subscription after failed payment"
                );
                Some(err)
            }
        }
    }
}

#[async_trait]
impl BillingEventHandler for InvoicePaymentFailedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoicePaymentFailed]
    }

    async fn handle(&self, event: &StripeEvent) -> PaymentConfirmation {
        let invoice: InvoiceObject = match event.deserialize_object() {
            Ok(invoice) => invoice,
            Err(e) => {
                return PaymentConfirmation::failed(
                    &event.id,
                    &ReconcileError::MalformedEvent(e.to_string()),
                )
            }
        };

        let user_id = match invoice.customer.as_deref() {
            Some(customer_id) => match self.subscriptions.find_user_by_customer(customer_id).await {
                Ok(user_id) => user_id,
                Err(e) => return PaymentConfirmation::failed(&event.id, &ReconcileError::from(e)),
            },
            None => None,
        };
        let Some(user_id) = user_id else {
            tracing::warn!(invoice_id = %invoice.id, "Failed invoice for unknown customer; skipping");
            return PaymentConfirmation::acknowledged(
                &event.id,
                format!("Invoice {} payment failure ignored: no matching user.", invoice.id),
            );
        };
        let wallet_id = match self.wallets.find_wallet_for_user(&user_id).await {
            Ok(Some(wallet_id)) => wallet_id,
            Ok(None) => {
                tracing::warn!(invoice_id = %invoice.id, user_id = %user_id, "No wallet for user; skipping");
                return PaymentConfirmation::acknowledged(
                    &event.id,
                    format!("Invoice {} payment failure ignored: no wallet.", invoice.id),
                );
            }
            Err(e) => return PaymentConfirmation::failed(&event.id, &ReconcileError::from(e)),
        };

        let mut metadata = Metadata::new();
        metadata.insert("type".into(), json!("RENEWAL_FAILED"));
        metadata.insert("stripe_event_id".into(), json!(event.id));
        metadata.insert("attempt_count".into(), json!(invoice.attempt_count));
        if let Some(reason) = &invoice.billing_reason {
            metadata.insert("billing_reason".into(), json!(reason));
        }
        if let Some(subscription_id) = invoice.subscription_id() {
            metadata.insert("stripe_subscription_id".into(), json!(subscription_id));
        }

        let record = NewPaymentTransaction::new(wallet_id, &self.gateway_id, PaymentStatus::Failed)
            .with_user(user_id.clone())
            .with_gateway_transaction_id(&invoice.id)
            .with_amount_minor(invoice.amount_due, &invoice.currency)
            .with_metadata(metadata);

        let transaction = match self.transactions.record_failure(record).await {
            Ok(FailureRecordOutcome::Recorded(transaction)) => transaction,
            Ok(FailureRecordOutcome::AlreadyCompleted(existing)) => {
                tracing::info!(
                    invoice_id = %invoice.id,
                    payment_transaction_id = %existing.id,
                    "Failure notice for an invoice that already completed; leaving it"
                );
                return PaymentConfirmation::acknowledged(existing.id.as_str(), "Invoice already processed.")
                    .with_gateway_transaction_id(&invoice.id);
            }
            Ok(FailureRecordOutcome::InFlight(existing)) => {
                tracing::warn!(
                    invoice_id = %invoice.id,
                    payment_transaction_id = %existing.id,
                    status = %existing.status,
                    "Failure notice for an invoice that is still being processed; leaving it"
                );
                return PaymentConfirmation::acknowledged(
                    existing.id.as_str(),
                    format!("Invoice {} is being processed; failure notice ignored.", invoice.id),
                )
                .with_gateway_transaction_id(&invoice.id);
            }
            Err(e) => {
                let err = ReconcileError::RecordCreationFailed(e.to_string());
                tracing::error!(invoice_id = %invoice.id, error = %err, "Could not record failed renewal");
                return PaymentConfirmation::failed(&event.id, &err)
                    .with_gateway_transaction_id(&invoice.id);
            }
        };

        tracing::info!(
            invoice_id = %invoice.id,
            payment_transaction_id = %transaction.id,
            attempt_count = invoice.attempt_count,
            "Renewal payment failure recorded"
        );

        let sync_error = match invoice.subscription_id() {
            Some(subscription_id) => self.sync_subscription(subscription_id, &user_id).await,
            None => None,
        };

        let confirmation = PaymentConfirmation::succeeded(transaction.id.as_str(), 0)
            .with_gateway_transaction_id(&invoice.id)
            .with_message(format!("Invoice {} payment failure recorded.", invoice.id));

        match sync_error {
            Some(err) => confirmation.with_warning(ReconcileErrorCode::SyncError, err.describe()),
            None => confirmation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryPaymentGateway, InMemoryPaymentTransactionRepository, InMemoryPlanCatalog,
        InMemoryTokenLedger, InMemoryUserSubscriptionRepository, InMemoryWalletDirectory,
    };
    use crate::domain::billing::{GatewaySubscription, StripeEventBuilder};
    use crate::domain::foundation::{PaymentTransactionId, Timestamp, WalletId};

    struct Fixture {
        transactions: Arc<InMemoryPaymentTransactionRepository>,
        gateway: Arc<InMemoryPaymentGateway>,
        subscriptions: Arc<InMemoryUserSubscriptionRepository>,
        handler: InvoicePaymentFailedHandler,
    }

    async fn fixture() -> Fixture {
        let transactions = Arc::new(InMemoryPaymentTransactionRepository::new());
        let gateway = Arc::new(InMemoryPaymentGateway::default());
        let subscriptions = Arc::new(InMemoryUserSubscriptionRepository::new());
        let wallets = Arc::new(InMemoryWalletDirectory::new());

        gateway
            .add_subscription(GatewaySubscription {
                id: "sub_1".to_string(),
                customer: Some("cus_1".to_string()),
                status: "past_due".to_string(),
                current_period_start: None,
                current_period_end: None,
                cancel_at_period_end: false,
                price_ids: vec![],
            })
            .await;
        let user = UserId::new("user_1").unwrap();
        subscriptions.link_customer("cus_1", user.clone()).await;
        wallets.add_wallet(user, WalletId::new("wallet_1").unwrap()).await;

        let ports = BillingPorts {
            transactions: transactions.clone(),
            ledger: Arc::new(InMemoryTokenLedger::new()),
            gateway: gateway.clone(),
            catalog: Arc::new(InMemoryPlanCatalog::new()),
            subscriptions: subscriptions.clone(),
            wallets,
        };
        Fixture {
            handler: InvoicePaymentFailedHandler::new(&ports),
            transactions,
            gateway,
            subscriptions,
        }
    }

    fn failed_invoice(customer: &str) -> StripeEvent {
        StripeEventBuilder::new()
            .id("evt_fail")
            .event_type("invoice.payment_failed")
            .object(json!({
                "id": "in_1",
                "customer": customer,
                "subscription": "sub_1",
                "amount_due": 2000,
                "currency": "usd",
                "attempt_count": 2,
                "billing_reason": "subscription_cycle"
            }))
            .build()
    }

    #[tokio::test]
    async fn records_failed_row_and_syncs_status() {
        let fx = fixture().await;

        let confirmation = fx.handler.handle(&failed_invoice("cus_1")).await;

        assert!(confirmation.success, "{:?}", confirmation);
        assert_eq!(confirmation.tokens_awarded, Some(0));
        assert_eq!(
            confirmation.message.as_deref(),
            Some("Invoice in_1 payment failure recorded.")
        );
        let rows = fx.transactions.for_gateway_transaction("in_1").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Failed);
        assert_eq!(rows[0].metadata_str("type"), Some("RENEWAL_FAILED"));
        assert_eq!(rows[0].amount_requested_fiat, Some(20.0));

        let row = fx.subscriptions.get("sub_1").await.unwrap();
        assert_eq!(row.status, "past_due");
    }

    #[tokio::test]
    async fn repeated_failures_update_one_row() {
        let fx = fixture().await;

        fx.handler.handle(&failed_invoice("cus_1")).await;
        fx.handler.handle(&failed_invoice("cus_1")).await;

        assert_eq!(fx.transactions.for_gateway_transaction("in_1").await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_customer_is_acknowledged() {
        let fx = fixture().await;

        let confirmation = fx.handler.handle(&failed_invoice("cus_unknown")).await;

        assert!(confirmation.success);
        assert_eq!(confirmation.tokens_awarded, None);
        assert!(fx.transactions.all().await.is_empty());
    }

    #[tokio::test]
    async fn gateway_outage_is_a_sync_warning() {
        let fx = fixture().await;
        fx.gateway.set_failing(true);

        let confirmation = fx.handler.handle(&failed_invoice("cus_1")).await;

        assert!(confirmation.success);
        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::SyncError));
        assert_eq!(fx.transactions.for_gateway_transaction("in_1").await.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_record_creation_failed() {
        let fx = fixture().await;
        fx.transactions.fail_creates().await;

        let confirmation = fx.handler.handle(&failed_invoice("cus_1")).await;

        assert!(!confirmation.success);
        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::RecordCreationFailed));
    }

    #[tokio::test]
    async fn late_failure_leaves_renewal_in_progress_untouched() {
        let fx = fixture().await;
        let claimed = NewPaymentTransaction::new(
            WalletId::new("wallet_1").unwrap(),
            "stripe",
            PaymentStatus::ProcessingRenewal,
        )
        .with_gateway_transaction_id("in_1")
        .into_transaction(PaymentTransactionId::new("ptxn_live").unwrap(), Timestamp::now());
        fx.transactions.seed(claimed).await;

        let confirmation = fx.handler.handle(&failed_invoice("cus_1")).await;

        assert!(confirmation.success);
        assert_eq!(confirmation.transaction_id, "ptxn_live");
        assert_eq!(
            confirmation.message.as_deref(),
            Some("Invoice in_1 is being processed; failure notice ignored.")
        );
        let rows = fx.transactions.for_gateway_transaction("in_1").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::ProcessingRenewal);
        assert!(fx.subscriptions.get("sub_1").await.is_none());
    }
}
