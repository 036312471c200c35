//! UserSubscriptionRepository port - the internal mirror of gateway subscriptions.

use async_trait::async_trait;

use crate::domain::billing::{SubscriptionState, UserSubscription};
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait UserSubscriptionRepository: Send + Sync {
    /// Map a gateway customer id to the internal user.
    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<UserId>, DomainError>;

    /// Find the row for a gateway subscription id.
    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Insert or overwrite the row keyed by `stripe_subscription_id`.
    async fn upsert(&self, subscription: &UserSubscription) -> Result<(), DomainError>;

    /// Update the row matching `stripe_subscription_id`; returns rows touched.
    async fn update(&self, state: &SubscriptionState) -> Result<u64, DomainError>;
}
