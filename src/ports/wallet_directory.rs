//! WalletDirectory port - locates the token wallet owned by a user.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId, WalletId};

#[async_trait]
pub trait WalletDirectory: Send + Sync {
    async fn find_wallet_for_user(&self, user_id: &UserId) -> Result<Option<WalletId>, DomainError>;
}
