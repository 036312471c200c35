//! Subscription plan reference data and the award policy derived from it.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, ValidationError};

/// Kind of purchase a plan represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Subscription,
    OneTimePurchase,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Subscription => "subscription",
            PlanType::OneTimePurchase => "one_time_purchase",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "subscription" => Ok(PlanType::Subscription),
            "one_time_purchase" => Ok(PlanType::OneTimePurchase),
            other => Err(ValidationError::invalid_format(
                "plan_type",
                format!("unknown plan type '{}'", other),
            )),
        }
    }
}

/// A row of the `subscription_plans` reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub stripe_price_id: String,
    pub item_id_internal: Option<String>,
    pub tokens_to_award: Option<i64>,
    pub plan_type: PlanType,
    pub active: bool,
}

/// Award policy for a gateway price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlan {
    pub plan_id: PlanId,
    pub tokens_to_award: i64,
    pub plan_type: PlanType,
    pub item_id_internal: Option<String>,
    pub stripe_price_id: String,
}

impl From<SubscriptionPlan> for ResolvedPlan {
    fn from(plan: SubscriptionPlan) -> Self {
        Self {
            plan_id: plan.id,
            // A plan without a configured count awards nothing.
            tokens_to_award: plan.tokens_to_award.unwrap_or(0).max(0),
            plan_type: plan.plan_type,
            item_id_internal: plan.item_id_internal,
            stripe_price_id: plan.stripe_price_id,
        }
    }
}
