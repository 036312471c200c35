//! SubscriptionLifecycleHandler - mirrors subscription updates and cancellations.

use async_trait::async_trait;
use std::sync::Arc;

use super::{BillingEventHandler, BillingPorts, SubscriptionSynchronizer, SyncOutcome};
use crate::domain::billing::{
    GatewaySubscription, PaymentConfirmation, ReconcileError, StripeEvent, StripeEventType,
    SubscriptionObject,
};
use crate::ports::UserSubscriptionRepository;

/// Status stored when the gateway deletes a subscription.
const CANCELED: &str = "canceled";

pub struct SubscriptionLifecycleHandler {
    subscriptions: Arc<dyn UserSubscriptionRepository>,
    synchronizer: Arc<SubscriptionSynchronizer>,
}

impl SubscriptionLifecycleHandler {
    pub fn new(ports: &BillingPorts) -> Self {
        Self {
            subscriptions: ports.subscriptions.clone(),
            synchronizer: ports.synchronizer(),
        }
    }
}

#[async_trait]
impl BillingEventHandler for SubscriptionLifecycleHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::CustomerSubscriptionUpdated,
            StripeEventType::CustomerSubscriptionDeleted,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> PaymentConfirmation {
        let subscription: GatewaySubscription = match event.deserialize_object::<SubscriptionObject>() {
            Ok(object) => object.into(),
            Err(e) => {
                return PaymentConfirmation::failed(
                    &event.id,
                    &ReconcileError::MalformedEvent(e.to_string()),
                )
            }
        };

        let existing = match self.subscriptions.find_by_subscription_id(&subscription.id).await {
            Ok(existing) => existing,
            Err(e) => {
                return PaymentConfirmation::failed(&event.id, &ReconcileError::SyncError(e.to_string()))
            }
        };
        let Some(existing) = existing else {
            tracing::warn!(
                stripe_subscription_id = %subscription.id,
                "Subscription event for a subscription with no local record"
            );
            return no_local_record(&event.id, &subscription.id);
        };

        let mut state = self.synchronizer.state_for(&subscription, None).await;
        if event.parsed_type() == StripeEventType::CustomerSubscriptionDeleted {
            state = state.with_status(CANCELED);
        }

        match self.synchronizer.write(state, None).await {
            Ok(SyncOutcome::NoMatchingRow) => no_local_record(&event.id, &subscription.id),
            Ok(_) => {
                tracing::info!(
                    stripe_subscription_id = %subscription.id,
                    user_id = %existing.user_id,
                    "Subscription mirror updated"
                );
                PaymentConfirmation::acknowledged(
                    &event.id,
                    format!("Subscription {} synchronized.", subscription.id),
                )
            }
            Err(err) => {
                tracing::error!(
                    stripe_subscription_id = %subscription.id,
                    error = %err,
                    "Subscription lifecycle sync failed"
                );
                PaymentConfirmation::failed(&event.id, &err)
            }
        }
    }
}

fn no_local_record(event_id: &str, subscription_id: &str) -> PaymentConfirmation {
    PaymentConfirmation::acknowledged(
        event_id,
        format!("Subscription {} has no local record.", subscription_id),
    )
}
