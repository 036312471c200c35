//! PlanCatalog port - read access to subscription plan reference data.

use async_trait::async_trait;

use crate::domain::billing::SubscriptionPlan;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// Find the plan configured for a gateway price id.
    async fn find_by_price_id(&self, price_id: &str) -> Result<Option<SubscriptionPlan>, DomainError>;
}
