//! InvoicePaymentSucceededHandler - credits tokens for subscription renewals.
//!
//! Saga steps, each leaving a durable status behind:
//!
//! 1. Probe for a `COMPLETED` row on the invoice id (replay stop)
//! 2. Resolve user, wallet and token count
//! 3. Insert a `PROCESSING_RENEWAL` row; the unique gateway key makes a
//!    concurrent delivery fail here with `AlreadyProcessing`
//! 4. Credit the ledger, or move the row to `TOKEN_AWARD_FAILED`
//! 5. Finalize the row to `COMPLETED`
//! 6. Mirror the subscription
//!
//! Once step 4 succeeds the reported outcome is success; failures in steps
//! 5 and 6 are attached as warnings and logged for manual repair.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    BillingEventHandler, BillingPorts, PlanResolver, SubscriptionPlanSource,
    SubscriptionSynchronizer,
};
use crate::domain::billing::{
    CreateOutcome, InvoiceMetadataSource, InvoiceObject, LedgerCredit, LineItemMetadataSource,
    Metadata, NewPaymentTransaction, PaymentConfirmation, PaymentStatus, PaymentTransaction,
    ReconcileError, ReconcileErrorCode, StatusTransition, StripeEvent, StripeEventType,
    TokenAward, TokenSourceChain, TransitionOutcome,
};
use crate::domain::foundation::{UserId, WalletId};
use crate::ports::{
    PaymentTransactionRepository, TokenLedger, UserSubscriptionRepository, WalletDirectory,
};

const FINALIZATION_WARNING: &str =
    "Payment processed and tokens awarded, but failed to update final payment status. Needs review.";

pub struct InvoicePaymentSucceededHandler {
    transactions: Arc<dyn PaymentTransactionRepository>,
    ledger: Arc<dyn TokenLedger>,
    subscriptions: Arc<dyn UserSubscriptionRepository>,
    wallets: Arc<dyn WalletDirectory>,
    plans: Arc<PlanResolver>,
    synchronizer: Arc<SubscriptionSynchronizer>,
    token_sources: TokenSourceChain,
    gateway_id: String,
}

impl InvoicePaymentSucceededHandler {
    pub fn new(ports: &BillingPorts) -> Self {
        let plans = ports.plan_resolver();
        Self {
            transactions: ports.transactions.clone(),
            ledger: ports.ledger.clone(),
            subscriptions: ports.subscriptions.clone(),
            wallets: ports.wallets.clone(),
            token_sources: TokenSourceChain::new(vec![
                Box::new(InvoiceMetadataSource),
                Box::new(LineItemMetadataSource),
                Box::new(SubscriptionPlanSource::new(plans.clone())),
            ]),
            plans,
            synchronizer: ports.synchronizer(),
            gateway_id: ports.gateway.gateway_id().to_string(),
        }
    }

    async fn resolve_recipient(&self, customer_id: &str) -> Result<(UserId, WalletId), ReconcileError> {
        let user_id = self
            .subscriptions
            .find_user_by_customer(customer_id)
            .await?
            .ok_or_else(|| ReconcileError::UserNotFound {
                customer_id: customer_id.to_string(),
            })?;

        let wallet_id = self
            .wallets
            .find_wallet_for_user(&user_id)
            .await?
            .ok_or_else(|| ReconcileError::WalletNotFound {
                user_id: user_id.to_string(),
            })?;

        Ok((user_id, wallet_id))
    }

    fn base_record(
        &self,
        invoice: &InvoiceObject,
        user_id: &UserId,
        wallet_id: &WalletId,
        status: PaymentStatus,
    ) -> NewPaymentTransaction {
        NewPaymentTransaction::new(wallet_id.clone(), &self.gateway_id, status)
            .with_user(user_id.clone())
            .with_gateway_transaction_id(&invoice.id)
            .with_amount_minor(invoice.amount_paid, &invoice.currency)
    }

    /// Audit row for a renewal whose plan could not be found.
    async fn record_plan_not_found(
        &self,
        event: &StripeEvent,
        invoice: &InvoiceObject,
        user_id: &UserId,
        wallet_id: &WalletId,
        err: &ReconcileError,
    ) {
        let mut metadata = Metadata::new();
        metadata.insert("stripe_event_id".into(), json!(event.id));
        metadata.insert("type".into(), json!("RENEWAL_PLAN_NOT_FOUND"));
        metadata.insert("reason".into(), json!(err.to_string()));
        if let Some(subscription_id) = invoice.subscription_id() {
            metadata.insert("stripe_subscription_id".into(), json!(subscription_id));
        }

        let record = self
            .base_record(invoice, user_id, wallet_id, PaymentStatus::Failed)
            .with_metadata(metadata);

        if let Err(e) = self.transactions.create(record).await {
            tracing::error!(
                invoice_id = %invoice.id,
                event_id = %event.id,
                error = %e,
                "Failed to insert FAILED payment transaction after plan lookup failure"
            );
        }
    }

    /// Marks the renewal `TOKEN_AWARD_FAILED` after a ledger error.
    async fn compensate(&self, transaction: &PaymentTransaction, reason: &str) {
        let transition = StatusTransition::to(PaymentStatus::TokenAwardFailed)
            .from_any_of(&[PaymentStatus::ProcessingRenewal])
            .with_metadata("token_award_error", reason);

        if let Err(e) = self.transactions.transition_status(&transaction.id, transition).await {
            tracing::error!(
                critical = true,
                payment_transaction_id = %transaction.id,
                error = %e,
                "Could not mark renewal TOKEN_AWARD_FAILED"
            );
        }
    }

    async fn finalize(&self, transaction: &PaymentTransaction) -> Option<ReconcileError> {
        let transition = StatusTransition::to(PaymentStatus::Completed)
            .from_any_of(&[PaymentStatus::ProcessingRenewal]);

        let problem = match self.transactions.transition_status(&transaction.id, transition).await {
            Ok(TransitionOutcome::Updated(_)) => return None,
            Ok(TransitionOutcome::Conflict { current }) => {
                format!("payment transaction is {} and cannot complete", current)
            }
            Ok(TransitionOutcome::NotFound) => "payment transaction disappeared".to_string(),
            Err(e) => e.to_string(),
        };

        tracing::error!(
            critical = true,
            payment_transaction_id = %transaction.id,
            error = %problem,
            "Tokens awarded but renewal could not be finalized"
        );
        Some(ReconcileError::FinalizationFailed(problem))
    }

    async fn sync_subscription(
        &self,
        invoice: &InvoiceObject,
        award: &TokenAward,
        user_id: &UserId,
        transaction: &PaymentTransaction,
    ) -> Option<ReconcileError> {
        let subscription = match (&award.subscription, invoice.subscription_id()) {
            (Some(subscription), _) => subscription.clone(),
            (None, Some(subscription_id)) => match self.plans.fetch_subscription(subscription_id).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let err = ReconcileError::SyncError(e.to_string());
                    self.log_sync_failure(transaction, subscription_id, &err);
                    return Some(err);
                }
            },
            (None, None) => return None,
        };

        let plan_id = award.plan.as_ref().map(|plan| plan.plan_id.clone());
        match self.synchronizer.sync(&subscription, Some(user_id), plan_id).await {
            Ok(_) => None,
            Err(err) => {
                self.log_sync_failure(transaction, &subscription.id, &err);
                Some(err)
            }
        }
    }

    fn log_sync_failure(&self, transaction: &PaymentTransaction, subscription_id: &str, err: &ReconcileError) {
        tracing::error!(
            critical = true,
            payment_transaction_id = %transaction.id,
            stripe_subscription_id = %subscription_id,
            error = %err,
            "Subscription sync failed after renewal credit"
        );
    }
}

#[async_trait]
impl BillingEventHandler for InvoicePaymentSucceededHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoicePaymentSucceeded]
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
        let fail = |err: &ReconcileError| {
            tracing::error!(invoice_id = %invoice.id, error = %err, "Renewal failed");
            PaymentConfirmation::failed(&event.id, err).with_gateway_transaction_id(&invoice.id)
        };

        // 1. Replay stop
        match self.transactions.find_terminal(&self.gateway_id, &invoice.id).await {
            Ok(Some(existing)) => {
                tracing::info!(
                    invoice_id = %invoice.id,
                    payment_transaction_id = %existing.id,
                    "Invoice already processed"
                );
                return PaymentConfirmation::succeeded(existing.id.as_str(), existing.tokens_to_award)
                    .with_gateway_transaction_id(&invoice.id)
                    .with_message("Invoice already processed.");
            }
            Ok(None) => {}
            Err(e) => return fail(&ReconcileError::from(e)),
        }

        // 2. Recipient
        let Some(customer_id) = invoice.customer.as_deref() else {
            tracing::warn!(invoice_id = %invoice.id, "Invoice has no customer; skipping");
            return PaymentConfirmation::acknowledged(
                &event.id,
                format!("Invoice {} has no customer; nothing to reconcile.", invoice.id),
            )
            .with_tokens(0);
        };
        let (user_id, wallet_id) = match self.resolve_recipient(customer_id).await {
            Ok(recipient) => recipient,
            Err(e) => return fail(&e),
        };

        // 3. Token count
        let award = match self.token_sources.resolve(&invoice).await {
            Ok(award) => award,
            Err(e @ ReconcileError::PlanNotFound { .. }) => {
                tracing::error!(
                    critical = true,
                    invoice_id = %invoice.id,
                    event_id = %event.id,
                    error = %e,
                    "Cannot determine tokens to award"
                );
                self.record_plan_not_found(event, &invoice, &user_id, &wallet_id, &e)
                    .await;
                return fail(&e);
            }
            Err(e) => return fail(&e),
        };
        if award.tokens <= 0 {
            if let Some(plan) = &award.plan {
                tracing::warn!(invoice_id = %invoice.id, plan_id = %plan.plan_id, "Plan awards 0 tokens");
            }
        }

        // 4. Claim the invoice
        let mut metadata = Metadata::new();
        metadata.insert("stripe_event_id".into(), json!(event.id));
        metadata.insert("type".into(), json!("RENEWAL"));
        metadata.insert("token_source".into(), json!(award.source));
        if let Some(subscription_id) = invoice.subscription_id() {
            metadata.insert("stripe_subscription_id".into(), json!(subscription_id));
        }
        let item_id_internal = award.plan.as_ref().and_then(|plan| plan.item_id_internal.clone());
        if let Some(item) = &item_id_internal {
            metadata.insert("item_id_internal".into(), json!(item));
        }
        if let Some(reason) = &invoice.billing_reason {
            metadata.insert("billing_reason".into(), json!(reason));
        }

        let record = match self
            .base_record(&invoice, &user_id, &wallet_id, PaymentStatus::ProcessingRenewal)
            .with_metadata(metadata)
            .with_tokens(award.tokens)
        {
            Ok(record) => record,
            Err(e) => return fail(&ReconcileError::RecordCreationFailed(e.to_string())),
        };

        let transaction = match self.transactions.create(record).await {
            Ok(CreateOutcome::Created(transaction)) => transaction,
            Ok(CreateOutcome::AlreadyExists) => {
                tracing::warn!(invoice_id = %invoice.id, "Invoice is being processed by another delivery");
                return fail(&ReconcileError::AlreadyProcessing(invoice.id.clone()));
            }
            Err(e) => return fail(&ReconcileError::RecordCreationFailed(e.to_string())),
        };
        let tx_id = transaction.id.as_str();

        // 5. Credit
        if award.tokens > 0 {
            let notes = json!({
                "reason": "Subscription Renewal",
                "invoice_id": invoice.id,
                "payment_transaction_id": tx_id,
                "stripe_event_id": event.id,
                "item_id_internal": item_id_internal.map(Value::String).unwrap_or(Value::Null),
            });
            let credit = LedgerCredit::purchase(
                wallet_id.clone(),
                award.tokens,
                user_id.clone(),
                &event.id,
                transaction.id.clone(),
                notes,
            );

            if let Err(e) = self.ledger.record_transaction(&credit).await {
                tracing::error!(
                    critical = true,
                    payment_transaction_id = %transaction.id,
                    invoice_id = %invoice.id,
                    error = %e,
                    "Token award failed after renewal payment"
                );
                self.compensate(&transaction, &e.to_string()).await;
                return PaymentConfirmation::failed(tx_id, &ReconcileError::LedgerError(e.to_string()))
                    .with_gateway_transaction_id(&invoice.id)
                    .with_tokens(0);
            }
        }

        // 6. Finalize and 7. sync; neither can turn this into a failure now
        let finalization_error = self.finalize(&transaction).await;
        let sync_error = self
            .sync_subscription(&invoice, &award, &user_id, &transaction)
            .await;

        let message = match (&finalization_error, award.tokens) {
            (Some(_), _) => FINALIZATION_WARNING.to_string(),
            (None, tokens) if tokens > 0 => {
                format!("Invoice {} processed, {} tokens awarded.", invoice.id, tokens)
            }
            (None, _) => format!("Invoice {} processed. No tokens to award.", invoice.id),
        };

        let confirmation = PaymentConfirmation::succeeded(tx_id, award.tokens)
            .with_gateway_transaction_id(&invoice.id)
            .with_message(message);

        match (sync_error, finalization_error) {
            (Some(sync), Some(finalization)) => confirmation.with_warning(
                ReconcileErrorCode::SyncError,
                format!("{}; {}", sync.describe(), finalization.describe()),
            ),
            (Some(sync), None) => {
                confirmation.with_warning(ReconcileErrorCode::SyncError, sync.describe())
            }
            (None, Some(finalization)) => confirmation
                .with_warning(ReconcileErrorCode::FinalizationFailed, finalization.describe()),
            (None, None) => confirmation,
        }
    }
}
