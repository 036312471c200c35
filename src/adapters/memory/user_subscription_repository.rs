//! In-memory UserSubscriptionRepository and WalletDirectory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::billing::{SubscriptionState, UserSubscription};
use crate::domain::foundation::{DomainError, UserId, WalletId};
use crate::ports::{UserSubscriptionRepository, WalletDirectory};

/// Subscription rows keyed by gateway subscription id, plus the customer
/// to user mapping.
#[derive(Default)]
pub struct InMemoryUserSubscriptionRepository {
    rows: RwLock<HashMap<String, UserSubscription>>,
    customers: RwLock<HashMap<String, UserId>>,
    fail_writes: AtomicBool,
}

impl InMemoryUserSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn link_customer(&self, customer_id: impl Into<String>, user_id: UserId) {
        self.customers.write().await.insert(customer_id.into(), user_id);
    }

    pub async fn seed(&self, subscription: UserSubscription) {
        self.rows
            .write()
            .await
            .insert(subscription.stripe_subscription_id.clone(), subscription);
    }

    pub async fn get(&self, subscription_id: &str) -> Option<UserSubscription> {
        self.rows.read().await.get(subscription_id).cloned()
    }

    /// Every row mirrored for a user.
    pub async fn for_user(&self, user_id: &UserId) -> Vec<UserSubscription> {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| &row.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Makes upserts and updates fail with a database error.
    pub fn set_failing_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), DomainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("user_subscriptions write failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl UserSubscriptionRepository for InMemoryUserSubscriptionRepository {
    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<UserId>, DomainError> {
        if let Some(user_id) = self.customers.read().await.get(customer_id) {
            return Ok(Some(user_id.clone()));
        }
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|row| row.stripe_customer_id.as_deref() == Some(customer_id))
            .map(|row| row.user_id.clone()))
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self.get(subscription_id).await)
    }

    async fn upsert(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        self.check_writes()?;
        let mut rows = self.rows.write().await;
        match rows.get_mut(&subscription.stripe_subscription_id) {
            Some(existing) => {
                let plan_id = subscription.plan_id.clone().or_else(|| existing.plan_id.clone());
                let stripe_customer_id = subscription
                    .stripe_customer_id
                    .clone()
                    .or_else(|| existing.stripe_customer_id.clone());
                *existing = UserSubscription {
                    plan_id,
                    stripe_customer_id,
                    ..subscription.clone()
                };
            }
            None => {
                rows.insert(
                    subscription.stripe_subscription_id.clone(),
                    subscription.clone(),
                );
            }
        }
        Ok(())
    }

    async fn update(&self, state: &SubscriptionState) -> Result<u64, DomainError> {
        self.check_writes()?;
        match self.rows.write().await.get_mut(&state.stripe_subscription_id) {
            Some(row) => {
                row.apply(state);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// User to wallet mapping.
#[derive(Default)]
pub struct InMemoryWalletDirectory {
    wallets: RwLock<HashMap<UserId, WalletId>>,
}

impl InMemoryWalletDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_wallet(&self, user_id: UserId, wallet_id: WalletId) {
        self.wallets.write().await.insert(user_id, wallet_id);
    }
}

#[async_trait]
impl WalletDirectory for InMemoryWalletDirectory {
    async fn find_wallet_for_user(&self, user_id: &UserId) -> Result<Option<WalletId>, DomainError> {
        Ok(self.wallets.read().await.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::PlanId;

    fn state(status: &str, plan: Option<&str>) -> SubscriptionState {
        state_for("sub_1", status, plan)
    }

    fn state_for(subscription_id: &str, status: &str, plan: Option<&str>) -> SubscriptionState {
        SubscriptionState {
            stripe_subscription_id: subscription_id.to_string(),
            stripe_customer_id: Some("cus_1".to_string()),
            status: status.to_string(),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            plan_id: plan.map(|p| PlanId::new(p).unwrap()),
        }
    }

    #[tokio::test]
    async fn update_without_matching_row_touches_nothing() {
        let repo = InMemoryUserSubscriptionRepository::new();
        assert_eq!(repo.update(&state("active", None)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_keeps_plan_when_not_provided() {
        let repo = InMemoryUserSubscriptionRepository::new();
        let user = UserId::new("user_1").unwrap();
        repo.upsert(&UserSubscription::from_state(user.clone(), state("active", Some("plan_gold"))))
            .await
            .unwrap();

        repo.update(&state("past_due", None)).await.unwrap();

        let row = repo.get("sub_1").await.unwrap();
        assert_eq!(row.status, "past_due");
        assert_eq!(row.plan_id, Some(PlanId::new("plan_gold").unwrap()));
    }

    #[tokio::test]
    async fn customer_lookup_falls_back_to_subscription_rows() {
        let repo = InMemoryUserSubscriptionRepository::new();
        let user = UserId::new("user_1").unwrap();
        repo.seed(UserSubscription::from_state(user.clone(), state("active", None)))
            .await;

        assert_eq!(repo.find_user_by_customer("cus_1").await.unwrap(), Some(user));
        assert_eq!(repo.find_user_by_customer("cus_other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_subscription_for_a_user_gets_its_own_row() {
        let repo = InMemoryUserSubscriptionRepository::new();
        let user = UserId::new("user_1").unwrap();

        repo.upsert(&UserSubscription::from_state(user.clone(), state_for("sub_a", "active", None)))
            .await
            .unwrap();
        repo.upsert(&UserSubscription::from_state(user.clone(), state_for("sub_b", "active", None)))
            .await
            .unwrap();

        assert!(repo.find_by_subscription_id("sub_a").await.unwrap().is_some());
        assert!(repo.find_by_subscription_id("sub_b").await.unwrap().is_some());
        assert_eq!(repo.for_user(&user).await.len(), 2);

        let touched = repo.update(&state_for("sub_a", "canceled", None)).await.unwrap();
        assert_eq!(touched, 1);
        assert_eq!(repo.get("sub_a").await.unwrap().status, "canceled");
        assert_eq!(repo.get("sub_b").await.unwrap().status, "active");
    }
}
