//! CheckoutSessionCompletedHandler - finalizes a pre-created payment row
//! once the customer has paid at checkout.
//!
//! The payment transaction was created when the session was opened, so this
//! handler only moves it forward: link the subscription (subscription mode),
//! mark it `COMPLETED`, then credit the wallet. A ledger failure after the
//! row is completed is compensated by moving it to `TOKEN_AWARD_FAILED`.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{BillingEventHandler, BillingPorts, PlanResolver, SubscriptionSynchronizer};
use crate::domain::billing::{
    CheckoutSessionObject, LedgerCredit, PaymentConfirmation, PaymentStatus, PaymentTransaction,
    ReconcileError, ReconcileErrorCode, StatusTransition, StripeEvent, StripeEventType,
    TransitionOutcome, INTERNAL_PAYMENT_ID_KEY,
};
use crate::domain::foundation::{PaymentTransactionId, PlanId};
use crate::ports::{PaymentGateway, PaymentTransactionRepository, TokenLedger};

const MISSING_INTERNAL_ID: &str = "Internal payment ID missing from webhook.";
const RECORD_NOT_FOUND: &str = "Payment record not found.";

pub struct CheckoutSessionCompletedHandler {
    transactions: Arc<dyn PaymentTransactionRepository>,
    ledger: Arc<dyn TokenLedger>,
    gateway: Arc<dyn PaymentGateway>,
    plans: Arc<PlanResolver>,
    synchronizer: Arc<SubscriptionSynchronizer>,
}

impl CheckoutSessionCompletedHandler {
    pub fn new(ports: &BillingPorts) -> Self {
        Self {
            transactions: ports.transactions.clone(),
            ledger: ports.ledger.clone(),
            gateway: ports.gateway.clone(),
            plans: ports.plan_resolver(),
            synchronizer: ports.synchronizer(),
        }
    }

    /// Internal id from the event's metadata, else from the gateway's copy of the session.
    async fn internal_payment_id(
        &self,
        session: &CheckoutSessionObject,
    ) -> Result<Option<String>, ReconcileError> {
        if let Some(id) = session.internal_payment_id() {
            return Ok(Some(id.to_string()));
        }

        tracing::warn!(
            checkout_session_id = %session.id,
            "internal_payment_id missing from event metadata; asking the gateway"
        );
        let fetched = self
            .gateway
            .retrieve_checkout_session(&session.id)
            .await
            .map_err(|e| ReconcileError::GatewayLookupFailed(e.to_string()))?;

        Ok(fetched.and_then(|s| {
            s.metadata
                .get(INTERNAL_PAYMENT_ID_KEY)
                .filter(|id| !id.trim().is_empty())
                .cloned()
        }))
    }

    /// Fetches the subscription, resolves its plan, and mirrors it.
    ///
    /// Only plan resolution errors are returned; a sync failure is reported
    /// back as a warning so crediting can go ahead.
    async fn link_subscription(
        &self,
        session: &CheckoutSessionObject,
        transaction: &PaymentTransaction,
    ) -> Result<(PlanId, Option<ReconcileError>), ReconcileError> {
        let subscription_id = session.subscription.as_deref().ok_or_else(|| {
            ReconcileError::GatewayLookupFailed(format!(
                "checkout session {} has no subscription",
                session.id
            ))
        })?;

        let (mut subscription, plan) = self.plans.resolve_subscription(subscription_id).await?;
        if subscription.customer.is_none() {
            subscription.customer = session.customer.clone();
        }

        let sync_error = match self
            .synchronizer
            .sync(&subscription, transaction.user_id.as_ref(), Some(plan.plan_id.clone()))
            .await
        {
            Ok(_) => None,
            Err(e) => {
                tracing::error!(
                    critical = true,
                    payment_transaction_id = %transaction.id,
                    stripe_subscription_id = %subscription_id,
                    error = %e,
                    "Subscription sync failed during checkout; continuing with token award"
                );
                Some(e)
            }
        };

        Ok((plan.plan_id, sync_error))
    }

    /// Moves the row out of `COMPLETED` after a failed credit.
    async fn compensate(&self, id: &PaymentTransactionId, reason: &str) {
        let transition = StatusTransition::to(PaymentStatus::TokenAwardFailed)
            .from_any_of(&[PaymentStatus::Completed])
            .with_metadata("token_award_error", reason);

        match self.transactions.transition_status(id, transition).await {
            Ok(TransitionOutcome::Updated(_)) => {}
            Ok(other) => tracing::error!(
                critical = true,
                payment_transaction_id = %id,
                outcome = ?other,
                "Could not mark payment TOKEN_AWARD_FAILED"
            ),
            Err(e) => tracing::error!(
                critical = true,
                payment_transaction_id = %id,
                error = %e,
                "Could not mark payment TOKEN_AWARD_FAILED"
            ),
        }
    }
}

#[async_trait]
impl BillingEventHandler for CheckoutSessionCompletedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::CheckoutSessionCompleted]
    }

    async fn handle(&self, event: &StripeEvent) -> PaymentConfirmation {
        // 1. Parse the session
        let session: CheckoutSessionObject = match event.deserialize_object() {
            Ok(session) => session,
            Err(e) => {
                return PaymentConfirmation::failed(
                    &event.id,
                    &ReconcileError::MalformedEvent(e.to_string()),
                )
            }
        };

        // 2. Find the internal payment id
        let internal_id = match self.internal_payment_id(&session).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::error!(checkout_session_id = %session.id, "{}", MISSING_INTERNAL_ID);
                return PaymentConfirmation::failed(
                    &event.id,
                    &ReconcileError::TransactionNotFound(MISSING_INTERNAL_ID.to_string()),
                )
                .with_gateway_transaction_id(&session.id);
            }
            Err(e) => {
                return PaymentConfirmation::failed(&event.id, &e)
                    .with_gateway_transaction_id(&session.id)
            }
        };
        let fail = |err: &ReconcileError| {
            PaymentConfirmation::failed(&internal_id, err).with_gateway_transaction_id(&session.id)
        };

        // 3. Load the row
        let found = match PaymentTransactionId::new(internal_id.clone()) {
            Ok(id) => self.transactions.find_by_id(&id).await,
            Err(_) => Ok(None),
        };
        let transaction = match found {
            Ok(Some(transaction)) => transaction,
            Ok(None) => {
                tracing::error!(payment_transaction_id = %internal_id, "{}", RECORD_NOT_FOUND);
                return fail(&ReconcileError::TransactionNotFound(RECORD_NOT_FOUND.to_string()));
            }
            Err(e) => return fail(&ReconcileError::from(e)),
        };

        // 4. Replays of settled rows are no-ops
        if transaction.status.is_settled() {
            return replay_confirmation(&transaction, &session.id);
        }

        // 5. Subscription mode: resolve the plan and mirror the subscription
        let mut sync_error = None;
        let mut plan_id = None;
        if session.is_subscription() {
            match self.link_subscription(&session, &transaction).await {
                Ok((linked_plan, warning)) => {
                    plan_id = Some(linked_plan);
                    sync_error = warning;
                }
                Err(e @ ReconcileError::PlanNotFound { .. }) => {
                    let transition = StatusTransition::to(PaymentStatus::Failed)
                        .from_any_of(&[PaymentStatus::Pending, PaymentStatus::ProcessingRenewal])
                        .with_metadata("failure_reason", e.to_string());
                    if let Err(mark_err) =
                        self.transactions.transition_status(&transaction.id, transition).await
                    {
                        tracing::error!(
                            payment_transaction_id = %transaction.id,
                            error = %mark_err,
                            "Could not mark payment FAILED after plan lookup"
                        );
                    }
                    return fail(&e);
                }
                // Transient: the row stays PENDING for the redelivery.
                Err(e) => return fail(&e),
            }
        } else if session.mode != "payment" {
            tracing::warn!(checkout_session_id = %session.id, mode = %session.mode, "Unexpected session mode");
        }

        // 6. Complete the row, claiming it against concurrent deliveries
        let mut transition = StatusTransition::to(PaymentStatus::Completed)
            .from_any_of(&[PaymentStatus::Pending, PaymentStatus::ProcessingRenewal])
            .with_gateway_transaction_id(&session.id)
            .with_metadata("stripe_event_id", event.id.as_str());
        if let Some(plan_id) = &plan_id {
            transition = transition.with_metadata("plan_id", plan_id.as_str());
        }
        let transaction = match self.transactions.transition_status(&transaction.id, transition).await {
            Ok(TransitionOutcome::Updated(row)) => row,
            Ok(TransitionOutcome::Conflict { current }) => {
                tracing::info!(
                    payment_transaction_id = %transaction.id,
                    current = %current,
                    "Payment claimed by a concurrent delivery"
                );
                let tokens = if current.is_terminal_success() {
                    transaction.tokens_to_award
                } else {
                    0
                };
                return PaymentConfirmation::succeeded(&internal_id, tokens)
                    .with_gateway_transaction_id(&session.id)
                    .with_message("Payment already processed.");
            }
            Ok(TransitionOutcome::NotFound) => {
                return fail(&ReconcileError::TransactionNotFound(RECORD_NOT_FOUND.to_string()))
            }
            Err(e) => {
                tracing::error!(payment_transaction_id = %transaction.id, error = %e, "Failed to mark payment COMPLETED");
                return fail(&ReconcileError::FinalizationFailed(e.to_string()));
            }
        };

        // 7. Credit the wallet
        let Some(user_id) = transaction.user_id.clone() else {
            let err = ReconcileError::LedgerError("user ID missing on payment record".to_string());
            self.compensate(&transaction.id, "user ID missing").await;
            return fail(&err).with_tokens(0);
        };

        let tokens = transaction.tokens_to_award;
        let mut confirmation = if tokens <= 0 {
            tracing::warn!(payment_transaction_id = %transaction.id, tokens, "No tokens to award");
            PaymentConfirmation::succeeded(&internal_id, 0)
                .with_gateway_transaction_id(&session.id)
                .with_message("Payment completed. No tokens to award.")
        } else {
            let credit = LedgerCredit::purchase(
                transaction.target_wallet_id.clone(),
                tokens,
                user_id,
                &event.id,
                transaction.id.clone(),
                json!({
                    "reason": "Checkout Session",
                    "checkout_session_id": session.id,
                    "mode": session.mode,
                    "stripe_event_id": event.id,
                }),
            );

            if let Err(e) = self.ledger.record_transaction(&credit).await {
                tracing::error!(
                    critical = true,
                    payment_transaction_id = %transaction.id,
                    event_id = %event.id,
                    error = %e,
                    "Token award failed after payment"
                );
                self.compensate(&transaction.id, &e.to_string()).await;
                return fail(&ReconcileError::LedgerError(e.to_string())).with_tokens(0);
            }

            PaymentConfirmation::succeeded(&internal_id, tokens)
                .with_gateway_transaction_id(&session.id)
                .with_message(format!("Payment {} completed, {} tokens awarded.", internal_id, tokens))
        };

        if let Some(e) = sync_error {
            confirmation = confirmation.with_warning(ReconcileErrorCode::SyncError, e.describe());
        }
        confirmation
    }
}

/// Answer for a delivery whose row was already settled by an earlier run.
fn replay_confirmation(transaction: &PaymentTransaction, session_id: &str) -> PaymentConfirmation {
    let confirmation = match transaction.status {
        PaymentStatus::Completed => {
            tracing::info!(payment_transaction_id = %transaction.id, "Payment already completed");
            PaymentConfirmation::succeeded(transaction.id.as_str(), transaction.tokens_to_award)
                .with_message("Payment already processed.")
        }
        PaymentStatus::TokenAwardFailed => {
            tracing::warn!(
                payment_transaction_id = %transaction.id,
                "Payment awaiting token reconciliation; not retrying award"
            );
            PaymentConfirmation::succeeded(transaction.id.as_str(), 0)
                .with_message("Payment already processed; token award awaits reconciliation.")
        }
        _ => {
            tracing::warn!(payment_transaction_id = %transaction.id, "Payment previously failed");
            PaymentConfirmation::succeeded(transaction.id.as_str(), 0)
                .with_message("Payment already processed, previously failed.")
        }
    };
    confirmation.with_gateway_transaction_id(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryPaymentGateway, InMemoryPaymentTransactionRepository, InMemoryPlanCatalog,
        InMemoryTokenLedger, InMemoryUserSubscriptionRepository, InMemoryWalletDirectory,
    };
    use crate::domain::billing::{
        GatewayCheckoutSession, GatewaySubscription, NewPaymentTransaction, PlanType,
        StripeEventBuilder, SubscriptionPlan, UserSubscription,
    };
    use crate::domain::foundation::{Timestamp, UserId, WalletId};
    use std::collections::HashMap;

    struct Fixture {
        transactions: Arc<InMemoryPaymentTransactionRepository>,
        ledger: Arc<InMemoryTokenLedger>,
        gateway: Arc<InMemoryPaymentGateway>,
        catalog: Arc<InMemoryPlanCatalog>,
        subscriptions: Arc<InMemoryUserSubscriptionRepository>,
        handler: CheckoutSessionCompletedHandler,
    }

    fn fixture() -> Fixture {
        let transactions = Arc::new(InMemoryPaymentTransactionRepository::new());
        let ledger = Arc::new(InMemoryTokenLedger::new());
        let gateway = Arc::new(InMemoryPaymentGateway::default());
        let catalog = Arc::new(InMemoryPlanCatalog::new());
        let subscriptions = Arc::new(InMemoryUserSubscriptionRepository::new());
        let ports = BillingPorts {
            transactions: transactions.clone(),
            ledger: ledger.clone(),
            gateway: gateway.clone(),
            catalog: catalog.clone(),
            subscriptions: subscriptions.clone(),
            wallets: Arc::new(InMemoryWalletDirectory::new()),
        };
        Fixture {
            handler: CheckoutSessionCompletedHandler::new(&ports),
            transactions,
            ledger,
            gateway,
            catalog,
            subscriptions,
        }
    }

    fn pending_row(id: &str, tokens: i64, status: PaymentStatus) -> PaymentTransaction {
        NewPaymentTransaction::new(WalletId::new("wallet_1").unwrap(), "stripe", status)
            .with_user(UserId::new("user_1").unwrap())
            .with_tokens(tokens)
            .unwrap()
            .into_transaction(PaymentTransactionId::new(id).unwrap(), Timestamp::now())
    }

    fn checkout_event(mode: &str, metadata: serde_json::Value) -> StripeEvent {
        let subscription = (mode == "subscription").then_some("sub_1");
        StripeEventBuilder::new()
            .id("evt_checkout_1")
            .event_type("checkout.session.completed")
            .object(json!({
                "id": "cs_1",
                "mode": mode,
                "customer": "cus_1",
                "subscription": subscription,
                "metadata": metadata,
            }))
            .build()
    }

    async fn add_gold_plan(fx: &Fixture) {
        fx.catalog
            .add_plan(SubscriptionPlan {
                id: PlanId::new("plan_gold").unwrap(),
                stripe_price_id: "price_gold".to_string(),
                item_id_internal: Some("gold_monthly".to_string()),
                tokens_to_award: Some(500),
                plan_type: PlanType::Subscription,
                active: true,
            })
            .await;
        fx.gateway
            .add_subscription(GatewaySubscription {
                id: "sub_1".to_string(),
                customer: Some("cus_1".to_string()),
                status: "active".to_string(),
                current_period_start: Some(1_704_067_200),
                current_period_end: Some(1_706_745_600),
                cancel_at_period_end: false,
                price_ids: vec!["price_gold".to_string()],
            })
            .await;
    }

    fn ptxn(id: &str) -> PaymentTransactionId {
        PaymentTransactionId::new(id).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // One-time purchases
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn one_time_purchase_completes_and_credits_once() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 100, PaymentStatus::Pending)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("payment", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.transaction_id, "ptxn_1");
        assert_eq!(confirmation.tokens_awarded, Some(100));
        assert_eq!(confirmation.payment_gateway_transaction_id.as_deref(), Some("cs_1"));

        let entries = fx.ledger.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].idempotency_key, "evt_checkout_1");

        let row = fx.transactions.get(&ptxn("ptxn_1")).await.unwrap();
        assert_eq!(row.status, PaymentStatus::Completed);
        assert_eq!(row.gateway_transaction_id.as_deref(), Some("cs_1"));
    }

    #[tokio::test]
    async fn replay_of_completed_payment_does_not_credit_again() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 100, PaymentStatus::Pending)).await;
        let event = checkout_event("payment", json!({"internal_payment_id": "ptxn_1"}));

        fx.handler.handle(&event).await;
        let replay = fx.handler.handle(&event).await;

        assert!(replay.success);
        assert_eq!(replay.tokens_awarded, Some(100));
        assert_eq!(replay.message.as_deref(), Some("Payment already processed."));
        assert_eq!(fx.ledger.call_count(), 1);
    }

    #[tokio::test]
    async fn replay_of_failed_payment_is_a_no_op() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 100, PaymentStatus::Failed)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("payment", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.tokens_awarded, Some(0));
        assert_eq!(fx.ledger.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_internal_id_is_transaction_not_found() {
        let fx = fixture();

        let confirmation = fx.handler.handle(&checkout_event("payment", json!({}))).await;

        assert!(!confirmation.success);
        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::TransactionNotFound));
        assert_eq!(
            confirmation.error.as_deref(),
            Some("TransactionNotFound: Internal payment ID missing from webhook.")
        );
    }

    #[tokio::test]
    async fn internal_id_recovered_from_gateway_session() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 10, PaymentStatus::Pending)).await;
        fx.gateway
            .add_checkout_session(GatewayCheckoutSession {
                id: "cs_1".to_string(),
                metadata: HashMap::from([(INTERNAL_PAYMENT_ID_KEY.to_string(), "ptxn_1".to_string())]),
            })
            .await;

        let confirmation = fx.handler.handle(&checkout_event("payment", json!(null))).await;

        assert!(confirmation.success);
        assert_eq!(confirmation.transaction_id, "ptxn_1");
    }

    #[tokio::test]
    async fn unknown_payment_record_is_transaction_not_found() {
        let fx = fixture();

        let confirmation = fx
            .handler
            .handle(&checkout_event("payment", json!({"internal_payment_id": "ptxn_404"})))
            .await;

        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::TransactionNotFound));
        assert_eq!(confirmation.transaction_id, "ptxn_404");
    }

    #[tokio::test]
    async fn ledger_failure_marks_token_award_failed() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 100, PaymentStatus::Pending)).await;
        fx.ledger.set_failing(true);

        let confirmation = fx
            .handler
            .handle(&checkout_event("payment", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(!confirmation.success);
        assert_eq!(confirmation.tokens_awarded, Some(0));
        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::LedgerError));
        assert_eq!(
            fx.transactions.get(&ptxn("ptxn_1")).await.unwrap().status,
            PaymentStatus::TokenAwardFailed
        );
    }

    #[tokio::test]
    async fn token_award_failed_replay_does_not_retry_credit() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 100, PaymentStatus::Pending)).await;
        fx.ledger.set_failing(true);
        let event = checkout_event("payment", json!({"internal_payment_id": "ptxn_1"}));
        fx.handler.handle(&event).await;
        fx.ledger.set_failing(false);

        let replay = fx.handler.handle(&event).await;

        assert!(replay.success);
        assert_eq!(replay.tokens_awarded, Some(0));
        assert_eq!(fx.ledger.call_count(), 1);
    }

    #[tokio::test]
    async fn zero_token_row_completes_without_ledger_call() {
        let fx = fixture();
        fx.transactions.seed(pending_row("ptxn_1", 0, PaymentStatus::Pending)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("payment", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.tokens_awarded, Some(0));
        assert_eq!(fx.ledger.call_count(), 0);
    }

    // ══════════════════════════════════════════════════════════════
    // Subscription activations
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn subscription_checkout_syncs_and_credits() {
        let fx = fixture();
        add_gold_plan(&fx).await;
        fx.transactions.seed(pending_row("ptxn_1", 500, PaymentStatus::Pending)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("subscription", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.tokens_awarded, Some(500));
        let row = fx.subscriptions.get("sub_1").await.unwrap();
        assert_eq!(row.stripe_subscription_id, "sub_1");
        assert_eq!(row.plan_id, Some(PlanId::new("plan_gold").unwrap()));
    }

    #[tokio::test]
    async fn replay_of_completed_subscription_checkout_touches_nothing() {
        let fx = fixture();
        add_gold_plan(&fx).await;
        fx.transactions.seed(pending_row("ptxn_1", 500, PaymentStatus::Completed)).await;
        fx.subscriptions
            .seed(UserSubscription {
                user_id: UserId::new("user_1").unwrap(),
                stripe_customer_id: Some("cus_1".to_string()),
                stripe_subscription_id: "sub_1".to_string(),
                status: "trialing".to_string(),
                current_period_start: None,
                current_period_end: None,
                cancel_at_period_end: false,
                plan_id: None,
            })
            .await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("subscription", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.tokens_awarded, Some(500));
        assert_eq!(fx.gateway.lookup_count(), 0);
        assert_eq!(fx.ledger.call_count(), 0);
        let row = fx.subscriptions.get("sub_1").await.unwrap();
        assert_eq!(row.status, "trialing");
        assert_eq!(row.plan_id, None);
    }

    #[tokio::test]
    async fn subscription_sync_failure_does_not_block_credit() {
        let fx = fixture();
        add_gold_plan(&fx).await;
        fx.subscriptions.set_failing_writes(true);
        fx.transactions.seed(pending_row("ptxn_1", 500, PaymentStatus::Pending)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("subscription", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert!(confirmation.success);
        assert_eq!(confirmation.tokens_awarded, Some(500));
        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::SyncError));
        assert_eq!(fx.ledger.call_count(), 1);
    }

    #[tokio::test]
    async fn subscription_plan_missing_fails_the_row() {
        let fx = fixture();
        fx.gateway
            .add_subscription(GatewaySubscription {
                id: "sub_1".to_string(),
                customer: Some("cus_1".to_string()),
                status: "active".to_string(),
                current_period_start: None,
                current_period_end: None,
                cancel_at_period_end: false,
                price_ids: vec!["price_unknown".to_string()],
            })
            .await;
        fx.transactions.seed(pending_row("ptxn_1", 500, PaymentStatus::Pending)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("subscription", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::PlanNotFound));
        assert_eq!(
            fx.transactions.get(&ptxn("ptxn_1")).await.unwrap().status,
            PaymentStatus::Failed
        );
        assert_eq!(fx.ledger.call_count(), 0);
    }

    #[tokio::test]
    async fn gateway_outage_leaves_row_pending() {
        let fx = fixture();
        fx.gateway.set_failing(true);
        fx.transactions.seed(pending_row("ptxn_1", 500, PaymentStatus::Pending)).await;

        let confirmation = fx
            .handler
            .handle(&checkout_event("subscription", json!({"internal_payment_id": "ptxn_1"})))
            .await;

        assert_eq!(confirmation.error_code, Some(ReconcileErrorCode::GatewayLookupFailed));
        assert_eq!(
            fx.transactions.get(&ptxn("ptxn_1")).await.unwrap().status,
            PaymentStatus::Pending
        );
    }
}
