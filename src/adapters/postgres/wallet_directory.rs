//! PostgreSQL implementation of WalletDirectory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::database_error;
use crate::domain::foundation::{DomainError, UserId, WalletId};
use crate::ports::WalletDirectory;

pub struct PostgresWalletDirectory {
    pool: PgPool,
}

impl PostgresWalletDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletDirectory for PostgresWalletDirectory {
    async fn find_wallet_for_user(&self, user_id: &UserId) -> Result<Option<WalletId>, DomainError> {
        let Ok(user_uuid) = Uuid::parse_str(user_id.as_str()) else {
            return Ok(None);
        };

        // Personal wallet only; organization wallets are not credited here.
        let wallet: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT wallet_id FROM token_wallets
            WHERE user_id = $1 AND organization_id IS NULL
            LIMIT 1
            "#,
        )
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("fetch token wallet", e))?;

        Ok(wallet.map(WalletId::from_uuid))
    }
}
