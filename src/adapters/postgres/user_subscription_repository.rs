//! PostgreSQL implementation of UserSubscriptionRepository.
//!
//! One row per gateway subscription; `stripe_subscription_id` is the
//! upsert and update key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt_row, database_error};
use crate::domain::billing::{SubscriptionState, UserSubscription};
use crate::domain::foundation::{DomainError, ErrorCode, PlanId, Timestamp, UserId};
use crate::ports::UserSubscriptionRepository;

pub struct PostgresUserSubscriptionRepository {
    pool: PgPool,
}

impl PostgresUserSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserSubscriptionRow {
    user_id: Uuid,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: Option<bool>,
    plan_id: Option<Uuid>,
}

impl TryFrom<UserSubscriptionRow> for UserSubscription {
    type Error = DomainError;

    fn try_from(row: UserSubscriptionRow) -> Result<Self, Self::Error> {
        Ok(UserSubscription {
            user_id: UserId::new(row.user_id.to_string()).map_err(|e| corrupt_row("user_id", e))?,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id.unwrap_or_default(),
            status: row.status,
            current_period_start: row.current_period_start.map(Timestamp::from_datetime),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end.unwrap_or(false),
            plan_id: row.plan_id.map(PlanId::from_uuid),
        })
    }
}

fn parse_plan_id(plan_id: Option<&PlanId>) -> Result<Option<Uuid>, DomainError> {
    plan_id
        .map(|id| {
            Uuid::parse_str(id.as_str()).map_err(|e| {
                DomainError::new(
                    ErrorCode::ValidationFailed,
                    format!("Plan ID must be a valid UUID: {}", e),
                )
            })
        })
        .transpose()
}

#[async_trait]
impl UserSubscriptionRepository for PostgresUserSubscriptionRepository {
    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<UserId>, DomainError> {
        let user: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM user_subscriptions WHERE stripe_customer_id = $1 LIMIT 1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("look up user by customer", e))?;

        user.map(|id| UserId::new(id.to_string()).map_err(|e| corrupt_row("user_id", e)))
            .transpose()
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let row: Option<UserSubscriptionRow> = sqlx::query_as(
            r#"
            SELECT user_id, stripe_customer_id, stripe_subscription_id, status,
                   current_period_start, current_period_end, cancel_at_period_end, plan_id
            FROM user_subscriptions
            WHERE stripe_subscription_id = $1
            LIMIT 1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("fetch user subscription", e))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn upsert(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        let user_uuid = Uuid::parse_str(subscription.user_id.as_str()).map_err(|e| {
            DomainError::new(
                ErrorCode::ValidationFailed,
                format!("User ID must be a valid UUID: {}", e),
            )
        })?;
        let plan_uuid = parse_plan_id(subscription.plan_id.as_ref())?;

        sqlx::query(
            r#"
            INSERT INTO user_subscriptions (
                user_id, stripe_customer_id, stripe_subscription_id, status,
                current_period_start, current_period_end, cancel_at_period_end, plan_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, user_subscriptions.stripe_customer_id),
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                plan_id = COALESCE(EXCLUDED.plan_id, user_subscriptions.plan_id),
                updated_at = NOW()
            "#,
        )
        .bind(user_uuid)
        .bind(&subscription.stripe_customer_id)
        .bind(&subscription.stripe_subscription_id)
        .bind(&subscription.status)
        .bind(subscription.current_period_start.map(|t| *t.as_datetime()))
        .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
        .bind(subscription.cancel_at_period_end)
        .bind(plan_uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("upsert user subscription", e))?;

        Ok(())
    }

    async fn update(&self, state: &SubscriptionState) -> Result<u64, DomainError> {
        let plan_uuid = parse_plan_id(state.plan_id.as_ref())?;

        let result = sqlx::query(
            r#"
            UPDATE user_subscriptions SET
                stripe_customer_id = COALESCE($2, stripe_customer_id),
                status = $3,
                current_period_start = $4,
                current_period_end = $5,
                cancel_at_period_end = $6,
                plan_id = COALESCE($7, plan_id),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(&state.stripe_subscription_id)
        .bind(&state.stripe_customer_id)
        .bind(&state.status)
        .bind(state.current_period_start.map(|t| *t.as_datetime()))
        .bind(state.current_period_end.map(|t| *t.as_datetime()))
        .bind(state.cancel_at_period_end)
        .bind(plan_uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("update user subscription", e))?;

        Ok(result.rows_affected())
    }
}
