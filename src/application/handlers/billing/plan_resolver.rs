//! PlanResolver - maps a gateway price, or a subscription's current price,
//! to the internal award policy.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::billing::{
    GatewaySubscription, InvoiceObject, ReconcileError, ResolvedPlan, TokenAward, TokenSource,
};
use crate::ports::{PaymentGateway, PlanCatalog};

/// Resolves plans against the catalog, using the gateway when the price is not known.
pub struct PlanResolver {
    catalog: Arc<dyn PlanCatalog>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PlanResolver {
    pub fn new(catalog: Arc<dyn PlanCatalog>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { catalog, gateway }
    }

    /// Looks a price up in the plan catalog.
    ///
    /// # Errors
    ///
    /// - `PlanNotFound` if no plan row carries this price id
    /// - `Storage` if the catalog cannot be read
    pub async fn resolve_price(&self, price_id: &str) -> Result<ResolvedPlan, ReconcileError> {
        let plan = self
            .catalog
            .find_by_price_id(price_id)
            .await?
            .ok_or_else(|| ReconcileError::PlanNotFound {
                price_id: price_id.to_string(),
            })?;

        if !plan.active {
            tracing::warn!(
                price_id = %price_id,
                plan_id = %plan.id,
                "Resolved an inactive subscription plan"
            );
        }

        Ok(plan.into())
    }

    /// Fetches a subscription from the gateway.
    ///
    /// A transport error and an unknown subscription are both `GatewayLookupFailed`.
    pub async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, ReconcileError> {
        match self.gateway.retrieve_subscription(subscription_id).await {
            Ok(Some(subscription)) => Ok(subscription),
            Ok(None) => Err(ReconcileError::GatewayLookupFailed(format!(
                "subscription {} not found at gateway",
                subscription_id
            ))),
            Err(e) => {
                tracing::error!(
                    stripe_subscription_id = %subscription_id,
                    error = %e,
                    retryable = e.retryable,
                    "Gateway subscription lookup failed"
                );
                Err(ReconcileError::GatewayLookupFailed(e.to_string()))
            }
        }
    }

    /// Fetches a subscription and resolves the plan of its first item.
    pub async fn resolve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<(GatewaySubscription, ResolvedPlan), ReconcileError> {
        let subscription = self.fetch_subscription(subscription_id).await?;
        let price_id = subscription.first_price_id().ok_or_else(|| {
            ReconcileError::GatewayLookupFailed(format!(
                "subscription {} has no priced items",
                subscription_id
            ))
        })?;
        let plan = self.resolve_price(price_id).await?;
        Ok((subscription, plan))
    }
}

/// Last link of the renewal token chain: the plan behind the invoice.
///
/// Uses the line item's price when the invoice carries one and falls back
/// to a gateway round-trip through the subscription otherwise. Passes when
/// the invoice has neither.
pub struct SubscriptionPlanSource {
    resolver: Arc<PlanResolver>,
}

impl SubscriptionPlanSource {
    pub fn new(resolver: Arc<PlanResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl TokenSource for SubscriptionPlanSource {
    fn name(&self) -> &'static str {
        "subscription_plan"
    }

    async fn resolve(&self, invoice: &InvoiceObject) -> Result<Option<TokenAward>, ReconcileError> {
        if let Some(price_id) = invoice.first_line_price_id() {
            let plan = self.resolver.resolve_price(price_id).await?;
            return Ok(Some(TokenAward {
                tokens: plan.tokens_to_award,
                source: self.name(),
                plan: Some(plan),
                subscription: None,
            }));
        }

        let Some(subscription_id) = invoice.subscription_id() else {
            return Ok(None);
        };

        let (subscription, plan) = self.resolver.resolve_subscription(subscription_id).await?;
        Ok(Some(TokenAward {
            tokens: plan.tokens_to_award,
            source: self.name(),
            plan: Some(plan),
            subscription: Some(subscription),
        }))
    }
}
