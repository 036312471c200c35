//! SubscriptionSynchronizer - keeps `user_subscriptions` in step with the gateway.
//!
//! Runs after tokens have been decided. Its failures are reported to the
//! caller as `SyncError` and never undo a ledger credit.

use std::sync::Arc;

use crate::domain::billing::{GatewaySubscription, ReconcileError, SubscriptionState, UserSubscription};
use crate::domain::foundation::{PlanId, UserId};
use crate::ports::{PlanCatalog, UserSubscriptionRepository};

/// What the synchronizer wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Row inserted or overwritten for a known user.
    Upserted,
    /// Existing rows updated by subscription id.
    Updated(u64),
    /// No user given and no row carries this subscription id.
    NoMatchingRow,
}

pub struct SubscriptionSynchronizer {
    subscriptions: Arc<dyn UserSubscriptionRepository>,
    catalog: Arc<dyn PlanCatalog>,
}

impl SubscriptionSynchronizer {
    pub fn new(
        subscriptions: Arc<dyn UserSubscriptionRepository>,
        catalog: Arc<dyn PlanCatalog>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
        }
    }

    /// Mirrors a gateway subscription.
    ///
    /// With a `user_id` the row is upserted; without one only an existing
    /// row for the subscription id is updated. When `plan_id` is `None` the
    /// plan is looked up by the subscription's first price.
    pub async fn sync(
        &self,
        subscription: &GatewaySubscription,
        user_id: Option<&UserId>,
        plan_id: Option<PlanId>,
    ) -> Result<SyncOutcome, ReconcileError> {
        let state = self.state_for(subscription, plan_id).await;
        self.write(state, user_id).await
    }

    /// Builds the row fields for a gateway subscription, linking its plan.
    pub async fn state_for(
        &self,
        subscription: &GatewaySubscription,
        plan_id: Option<PlanId>,
    ) -> SubscriptionState {
        let plan_id = match plan_id {
            Some(plan_id) => Some(plan_id),
            None => self.link_plan(subscription).await,
        };
        SubscriptionState::from_gateway(subscription, plan_id)
    }

    /// Persists already-built row fields.
    pub async fn write(
        &self,
        state: SubscriptionState,
        user_id: Option<&UserId>,
    ) -> Result<SyncOutcome, ReconcileError> {
        let subscription_id = state.stripe_subscription_id.clone();

        let outcome = match user_id {
            Some(user_id) => {
                let row = UserSubscription::from_state(user_id.clone(), state);
                self.subscriptions
                    .upsert(&row)
                    .await
                    .map_err(|e| ReconcileError::SyncError(e.to_string()))?;
                SyncOutcome::Upserted
            }
            None => {
                let touched = self
                    .subscriptions
                    .update(&state)
                    .await
                    .map_err(|e| ReconcileError::SyncError(e.to_string()))?;
                if touched == 0 {
                    SyncOutcome::NoMatchingRow
                } else {
                    SyncOutcome::Updated(touched)
                }
            }
        };

        match outcome {
            SyncOutcome::NoMatchingRow => tracing::warn!(
                stripe_subscription_id = %subscription_id,
                "No user_subscriptions row for gateway subscription"
            ),
            _ => tracing::info!(
                stripe_subscription_id = %subscription_id,
                outcome = ?outcome,
                "Subscription synchronized"
            ),
        }

        Ok(outcome)
    }

    /// Plan for the first priced item; a miss leaves the stored plan untouched.
    async fn link_plan(&self, subscription: &GatewaySubscription) -> Option<PlanId> {
        let price_id = subscription.first_price_id()?;
        match self.catalog.find_by_price_id(price_id).await {
            Ok(Some(plan)) => Some(plan.id),
            Ok(None) => {
                tracing::warn!(
                    stripe_subscription_id = %subscription.id,
                    price_id = %price_id,
                    "No subscription plan for price; plan link unchanged"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    stripe_subscription_id = %subscription.id,
                    error = %e,
                    "Plan lookup failed; plan link unchanged"
                );
                None
            }
        }
    }
}
