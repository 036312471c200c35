//! Subscription views: the gateway's copy and the internal record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::{PlanId, Timestamp, UserId};

/// Subscription as reported by the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    /// Unix seconds.
    pub current_period_start: Option<i64>,
    /// Unix seconds.
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    /// Price ids of the subscription items, in item order.
    pub price_ids: Vec<String>,
}

impl GatewaySubscription {
    /// Price of the first subscription item; this is what decides the plan.
    pub fn first_price_id(&self) -> Option<&str> {
        self.price_ids.first().map(String::as_str)
    }
}

/// Checkout session as reported by the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayCheckoutSession {
    pub id: String,
    pub metadata: HashMap<String, String>,
}

/// Subscription fields the synchronizer writes, keyed by `stripe_subscription_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    pub status: String,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    /// Left untouched on update when `None`.
    pub plan_id: Option<PlanId>,
}

impl SubscriptionState {
    /// Maps the gateway's subscription directly onto the internal fields.
    pub fn from_gateway(subscription: &GatewaySubscription, plan_id: Option<PlanId>) -> Self {
        Self {
            stripe_subscription_id: subscription.id.clone(),
            stripe_customer_id: subscription.customer.clone(),
            status: subscription.status.clone(),
            current_period_start: subscription
                .current_period_start
                .and_then(Timestamp::from_unix_secs),
            current_period_end: subscription
                .current_period_end
                .and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: subscription.cancel_at_period_end,
            plan_id,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// Row of the `user_subscriptions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub user_id: UserId,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: String,
    pub status: String,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub plan_id: Option<PlanId>,
}

impl UserSubscription {
    pub fn from_state(user_id: UserId, state: SubscriptionState) -> Self {
        Self {
            user_id,
            stripe_customer_id: state.stripe_customer_id,
            stripe_subscription_id: state.stripe_subscription_id,
            status: state.status,
            current_period_start: state.current_period_start,
            current_period_end: state.current_period_end,
            cancel_at_period_end: state.cancel_at_period_end,
            plan_id: state.plan_id,
        }
    }

    /// Overwrites the gateway-owned fields; `plan_id` only when provided.
    pub fn apply(&mut self, state: &SubscriptionState) {
        if state.stripe_customer_id.is_some() {
            self.stripe_customer_id = state.stripe_customer_id.clone();
        }
        self.status = state.status.clone();
        self.current_period_start = state.current_period_start;
        self.current_period_end = state.current_period_end;
        self.cancel_at_period_end = state.cancel_at_period_end;
        if state.plan_id.is_some() {
            self.plan_id = state.plan_id.clone();
        }
    }
}
