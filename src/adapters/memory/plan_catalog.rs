//! In-memory PlanCatalog.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::billing::SubscriptionPlan;
use crate::domain::foundation::DomainError;
use crate::ports::PlanCatalog;

#[derive(Default)]
pub struct InMemoryPlanCatalog {
    plans: RwLock<HashMap<String, SubscriptionPlan>>,
    fail: AtomicBool,
}

impl InMemoryPlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_plan(&self, plan: SubscriptionPlan) {
        self.plans.write().await.insert(plan.stripe_price_id.clone(), plan);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlanCatalog for InMemoryPlanCatalog {
    async fn find_by_price_id(&self, price_id: &str) -> Result<Option<SubscriptionPlan>, DomainError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DomainError::database("subscription_plans lookup failed"));
        }
        Ok(self.plans.read().await.get(price_id).cloned())
    }
}
