//! PostgreSQL implementation of PlanCatalog.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt_row, database_error};
use crate::domain::billing::{PlanType, SubscriptionPlan};
use crate::domain::foundation::{DomainError, PlanId};
use crate::ports::PlanCatalog;

pub struct PostgresPlanCatalog {
    pool: PgPool,
}

impl PostgresPlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    stripe_price_id: String,
    item_id_internal: Option<String>,
    tokens_to_award: Option<i64>,
    plan_type: String,
    active: bool,
}

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionPlan {
            id: PlanId::from_uuid(row.id),
            stripe_price_id: row.stripe_price_id,
            item_id_internal: row.item_id_internal,
            tokens_to_award: row.tokens_to_award,
            plan_type: PlanType::parse(&row.plan_type).map_err(|e| corrupt_row("plan_type", e))?,
            active: row.active,
        })
    }
}

#[async_trait]
impl PlanCatalog for PostgresPlanCatalog {
    async fn find_by_price_id(&self, price_id: &str) -> Result<Option<SubscriptionPlan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, stripe_price_id, item_id_internal, tokens_to_award, plan_type, active
            FROM subscription_plans
            WHERE stripe_price_id = $1
            LIMIT 1
            "#,
        )
        .bind(price_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("fetch subscription plan", e))?;

        row.map(SubscriptionPlan::try_from).transpose()
    }
}
