//! PostgreSQL implementation of TokenLedger.
//!
//! Credits go through the `record_token_transaction` procedure, which
//! updates the wallet balance and appends the ledger row in one
//! statement and returns the existing row for a repeated idempotency key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt_row, database_error};
use crate::domain::billing::{LedgerCredit, LedgerTransactionType, TokenWalletTransaction};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId, WalletId};
use crate::ports::TokenLedger;

/// SQLSTATE raised by `RAISE EXCEPTION` inside the procedure.
const RAISE_EXCEPTION: &str = "P0001";

pub struct PostgresTokenLedger {
    pool: PgPool,
}

impl PostgresTokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    transaction_id: Uuid,
    wallet_id: Uuid,
    transaction_type: String,
    amount: String,
    balance_after_txn: String,
    recorded_by_user_id: Uuid,
    related_entity_id: Option<String>,
    related_entity_type: Option<String>,
    idempotency_key: String,
    notes: Option<Value>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for TokenWalletTransaction {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let transaction_type = match row.transaction_type.as_str() {
            "CREDIT_PURCHASE" => LedgerTransactionType::CreditPurchase,
            other => return Err(corrupt_row("transaction_type", other)),
        };

        Ok(TokenWalletTransaction {
            transaction_id: row.transaction_id.to_string(),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            transaction_type,
            amount: row.amount,
            balance_after_txn: row.balance_after_txn,
            recorded_by_user_id: UserId::new(row.recorded_by_user_id.to_string())
                .map_err(|e| corrupt_row("recorded_by_user_id", e))?,
            related_entity_id: row.related_entity_id,
            related_entity_type: row.related_entity_type,
            idempotency_key: row.idempotency_key,
            notes: row.notes,
            timestamp: Timestamp::from_datetime(row.timestamp),
        })
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DomainError> {
    Uuid::parse_str(value).map_err(|e| {
        DomainError::new(
            ErrorCode::ValidationFailed,
            format!("{} must be a valid UUID: {}", field, e),
        )
    })
}

fn ledger_error(err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(RAISE_EXCEPTION) {
            return DomainError::new(ErrorCode::LedgerRejected, db_err.message().to_string());
        }
    }
    database_error("record token transaction", err)
}

#[async_trait]
impl TokenLedger for PostgresTokenLedger {
    async fn record_transaction(
        &self,
        credit: &LedgerCredit,
    ) -> Result<TokenWalletTransaction, DomainError> {
        let wallet_uuid = parse_uuid("wallet_id", credit.wallet_id.as_str())?;
        let user_uuid = parse_uuid("recorded_by_user_id", credit.recorded_by_user_id.as_str())?;
        let payment_uuid = credit.related_entity_id.to_uuid();

        let row: LedgerRow = sqlx::query_as(
            r#"
            SELECT transaction_id, wallet_id, transaction_type,
                   amount::text AS amount, balance_after_txn::text AS balance_after_txn,
                   recorded_by_user_id, related_entity_id, related_entity_type,
                   idempotency_key, notes, "timestamp"
            FROM record_token_transaction($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(wallet_uuid)
        .bind(credit.transaction_type.as_str())
        .bind(&credit.amount)
        .bind(user_uuid)
        .bind(&credit.idempotency_key)
        .bind(credit.related_entity_id.as_str())
        .bind(&credit.related_entity_type)
        .bind(&credit.notes)
        .bind(payment_uuid)
        .fetch_one(&self.pool)
        .await
        .map_err(ledger_error)?;

        tracing::debug!(
            wallet_id = %credit.wallet_id,
            idempotency_key = %credit.idempotency_key,
            balance_after = %row.balance_after_txn,
            "Ledger credit recorded"
        );

        row.try_into()
    }
}
