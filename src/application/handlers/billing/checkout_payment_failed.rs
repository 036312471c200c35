//! CheckoutPaymentFailedHandler - closes out checkouts that will never be paid.
//!
//! Covers asynchronous payment failures, failed payment intents and
//! expired sessions. The pre-created row moves `PENDING -> FAILED` with
//! the reason in metadata; rows that already left `PENDING` are left alone.

use async_trait::async_trait;
use std::sync::Arc;

use super::{BillingEventHandler, BillingPorts};
use crate::domain::billing::{
    PaymentAttemptObject, PaymentConfirmation, PaymentStatus, ReconcileError, StatusTransition,
    StripeEvent, StripeEventType, TransitionOutcome,
};
use crate::domain::foundation::PaymentTransactionId;
use crate::ports::PaymentTransactionRepository;

/// `failure_reason` stored on the row for each event type.
fn failure_reason(event_type: StripeEventType) -> &'static str {
    match event_type {
        StripeEventType::CheckoutSessionExpired => "expired",
        _ => "payment_failed",
    }
}

pub struct CheckoutPaymentFailedHandler {
    transactions: Arc<dyn PaymentTransactionRepository>,
}

impl CheckoutPaymentFailedHandler {
    pub fn new(ports: &BillingPorts) -> Self {
        Self {
            transactions: ports.transactions.clone(),
        }
    }
}

#[async_trait]
impl BillingEventHandler for CheckoutPaymentFailedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::CheckoutSessionAsyncPaymentFailed,
            StripeEventType::CheckoutSessionExpired,
            StripeEventType::PaymentIntentPaymentFailed,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> PaymentConfirmation {
        let attempt: PaymentAttemptObject = match event.deserialize_object() {
            Ok(attempt) => attempt,
            Err(e) => {
                return PaymentConfirmation::failed(
                    &event.id,
                    &ReconcileError::MalformedEvent(e.to_string()),
                )
            }
        };
        let reason = failure_reason(event.parsed_type());

        // Payment intents outside our checkout flow carry no internal id.
        let Some(internal_id) = attempt.internal_payment_id() else {
            tracing::warn!(stripe_object_id = %attempt.id, reason, "No internal_payment_id; nothing to close");
            return PaymentConfirmation::acknowledged(
                &event.id,
                format!("{} handled, but no internal_payment_id found.", event.event_type),
            );
        };
        let not_found = || {
            tracing::warn!(payment_transaction_id = %internal_id, reason, "Payment record not found");
            PaymentConfirmation::acknowledged(
                internal_id,
                format!("Payment {} not found; nothing to close.", internal_id),
            )
        };
        let Ok(id) = PaymentTransactionId::new(internal_id) else {
            return not_found();
        };

        let transition = StatusTransition::to(PaymentStatus::Failed)
            .from_any_of(&[PaymentStatus::Pending])
            .with_metadata("failure_reason", reason)
            .with_metadata("stripe_event_id", event.id.as_str())
            .with_metadata("stripe_object_id", attempt.id.as_str());

        match self.transactions.transition_status(&id, transition).await {
            Ok(TransitionOutcome::Updated(row)) => {
                tracing::info!(payment_transaction_id = %row.id, reason, "Checkout payment marked FAILED");
                PaymentConfirmation::succeeded(row.id.as_str(), 0)
                    .with_gateway_transaction_id(&attempt.id)
                    .with_message(format!("Payment {} marked as FAILED ({}).", row.id, reason))
            }
            Ok(TransitionOutcome::Conflict { current }) => {
                tracing::info!(
                    payment_transaction_id = %internal_id,
                    current = %current,
                    reason,
                    "Payment already left PENDING; failure notice ignored"
                );
                PaymentConfirmation::acknowledged(
                    internal_id,
                    format!("Payment {} is {}; failure notice ignored.", internal_id, current),
                )
                .with_gateway_transaction_id(&attempt.id)
            }
            Ok(TransitionOutcome::NotFound) => not_found(),
            Err(e) => {
                tracing::error!(payment_transaction_id = %internal_id, error = %e, "Could not mark payment FAILED");
                PaymentConfirmation::failed(internal_id, &ReconcileError::from(e))
                    .with_gateway_transaction_id(&attempt.id)
            }
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
    use crate::domain::billing::{
        NewPaymentTransaction, PaymentTransaction, ReconcileErrorCode, StripeEventBuilder,
    };
    use crate::domain::foundation::{Timestamp, WalletId};
    use serde_json::{json, Value};

    struct Fixture {
        transactions: Arc<InMemoryPaymentTransactionRepository>,
        handler: CheckoutPaymentFailedHandler,
    }

    fn fixture() -> Fixture {
        let transactions = Arc::new(InMemoryPaymentTransactionRepository::new());
        let ports = BillingPorts {
            transactions: transactions.clone(),
            ledger: Arc::new(InMemoryTokenLedger::new()),
            gateway: Arc::new(InMemoryPaymentGateway::default()),
            catalog: Arc::new(InMemoryPlanCatalog::new()),
            subscriptions: Arc::new(InMemoryUserSubscriptionRepository::new()),
            wallets: Arc::new(InMemoryWalletDirectory::new()),
        };
        Fixture {
            handler: CheckoutPaymentFailedHandler::new(&ports),
            transactions,
        }
    }

    async fn seed(fx: &Fixture, status: PaymentStatus) {
        let row = NewPaymentTransaction::new(WalletId::new("wallet_1").unwrap(), "stripe", status)
            .with_tokens(100)
            .unwrap()
            .into_transaction(PaymentTransactionId::new("ptxn_1").unwrap(), Timestamp::now());
        fx.transactions.seed(row).await;
    }

    fn event(event_type: &str, object_id: &str, metadata: Value) -> StripeEvent {
        StripeEventBuilder::new()
            .id("evt_fail_1")
            .event_type(event_type)
            .object(json!({ "id": object_id, "metadata": metadata }))
            .build()
    }

    async fn stored(fx: &Fixture) -> PaymentTransaction {
        fx.transactions
            .get(&PaymentTransactionId::new("ptxn_1").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn async_payment_failure_marks_pending_row_failed() {
        let fx = fixture();
        seed(&fx, PaymentStatus::Pending).await;

        let confirmation = fx
            .handler
            .handle(&event(
                "checkout.session.async_payment_failed",
                "cs_1",
                json!({"internal_payment_id": "ptxn_1"}),
            ))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.transaction_id, "ptxn_1");
        assert_eq!(confirmation.tokens_awarded, Some(0));
        let row = stored(&fx).await;
        assert_eq!(row.status, PaymentStatus::Failed);
        assert_eq!(row.metadata_str("failure_reason"), Some("payment_failed"));
        assert_eq!(row.metadata_str("stripe_object_id"), Some("cs_1"));
    }

    #[tokio::test]
    async fn failed_payment_intent_marks_pending_row_failed() {
        let fx = fixture();
        seed(&fx, PaymentStatus::Pending).await;

        fx.handler
            .handle(&event(
                "payment_intent.payment_failed",
                "pi_1",
                json!({"internal_payment_id": "ptxn_1"}),
            ))
            .await;

        assert_eq!(stored(&fx).await.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn expired_session_is_failed_with_reason() {
        let fx = fixture();
        seed(&fx, PaymentStatus::Pending).await;

        let confirmation = fx
            .handler
            .handle(&event(
                "checkout.session.expired",
                "cs_1",
                json!({"internal_payment_id": "ptxn_1"}),
            ))
            .await;

        assert_eq!(
            confirmation.message.as_deref(),
            Some("Payment ptxn_1 marked as FAILED (expired).")
        );
        let row = stored(&fx).await;
        assert_eq!(row.status, PaymentStatus::Failed);
        assert_eq!(row.metadata_str("failure_reason"), Some("expired"));
    }

    #[tokio::test]
    async fn completed_row_is_left_alone() {
        let fx = fixture();
        seed(&fx, PaymentStatus::Completed).await;

        let confirmation = fx
            .handler
            .handle(&event(
                "checkout.session.expired",
                "cs_1",
                json!({"internal_payment_id": "ptxn_1"}),
            ))
            .await;

        assert!(confirmation.success);
        assert_eq!(
            confirmation.message.as_deref(),
            Some("Payment ptxn_1 is COMPLETED; failure notice ignored.")
        );
        assert_eq!(stored(&fx).await.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn missing_internal_id_is_acknowledged() {
        let fx = fixture();

        let confirmation = fx
            .handler
            .handle(&event("payment_intent.payment_failed", "pi_1", Value::Null))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.transaction_id, "evt_fail_1");
        assert!(fx.transactions.all().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_row_is_acknowledged() {
        let fx = fixture();

        let confirmation = fx
            .handler
            .handle(&event(
                "checkout.session.expired",
                "cs_1",
                json!({"internal_payment_id": "ptxn_missing"}),
            ))
            .await;

        assert!(confirmation.success);
        assert_eq!(
            confirmation.message.as_deref(),
            Some("Payment ptxn_missing not found; nothing to close.")
        );
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let fx = fixture();
        seed(&fx, PaymentStatus::Pending).await;
        fx.transactions.fail_transitions_to(PaymentStatus::Failed).await;

        let confirmation = fx
            .handler
            .handle(&event(
                "checkout.session.async_payment_failed",
                "cs_1",
                json!({"internal_payment_id": "ptxn_1"}),
            ))
            .await;

        assert!(!confirmation.success);
        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::Storage));
        assert_eq!(stored(&fx).await.status, PaymentStatus::Pending);
    }
}
