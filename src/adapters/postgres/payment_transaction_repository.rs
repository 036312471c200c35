//! PostgreSQL implementation of PaymentTransactionRepository.
//!
//! The partial unique index `payment_transactions_gateway_txn_key` on
//! `(payment_gateway_id, gateway_transaction_id) WHERE status <> 'FAILED'`
//! is what turns a concurrent second delivery into `AlreadyExists`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt_row, database_error};
use crate::domain::billing::{
    CreateOutcome, FailureRecordOutcome, Metadata, NewPaymentTransaction, PaymentStatus,
    PaymentTransaction, StatusTransition, TransitionOutcome,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentTransactionId, Timestamp, UserId, WalletId,
};
use crate::ports::PaymentTransactionRepository;

const GATEWAY_TXN_KEY: &str = "payment_transactions_gateway_txn_key";

const COLUMNS: &str = "id, user_id, target_wallet_id, payment_gateway_id, gateway_transaction_id, \
     tokens_to_award, status, amount_requested_fiat, currency_requested_fiat, metadata_json, \
     created_at, updated_at";

/// PostgreSQL implementation of the PaymentTransactionRepository port.
pub struct PostgresPaymentTransactionRepository {
    pool: PgPool,
}

impl PostgresPaymentTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: Uuid) -> Result<Option<PaymentStatus>, DomainError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM payment_transactions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("read payment transaction status", e))?;

        status
            .map(|s| PaymentStatus::parse(&s).map_err(|e| corrupt_row("status", e)))
            .transpose()
    }
}

/// Database row representation of a payment transaction.
#[derive(Debug, sqlx::FromRow)]
struct PaymentTransactionRow {
    id: Uuid,
    user_id: Option<Uuid>,
    target_wallet_id: Uuid,
    payment_gateway_id: String,
    gateway_transaction_id: Option<String>,
    tokens_to_award: i64,
    status: String,
    amount_requested_fiat: Option<f64>,
    currency_requested_fiat: Option<String>,
    metadata_json: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentTransactionRow> for PaymentTransaction {
    type Error = DomainError;

    fn try_from(row: PaymentTransactionRow) -> Result<Self, Self::Error> {
        let user_id = row
            .user_id
            .map(|id| UserId::new(id.to_string()))
            .transpose()
            .map_err(|e| corrupt_row("user_id", e))?;

        Ok(PaymentTransaction {
            id: PaymentTransactionId::from_uuid(row.id),
            user_id,
            target_wallet_id: WalletId::from_uuid(row.target_wallet_id),
            payment_gateway_id: row.payment_gateway_id,
            gateway_transaction_id: row.gateway_transaction_id,
            tokens_to_award: row.tokens_to_award,
            status: PaymentStatus::parse(&row.status).map_err(|e| corrupt_row("status", e))?,
            amount_requested_fiat: row.amount_requested_fiat,
            currency: row.currency_requested_fiat,
            metadata: metadata_from_json(row.metadata_json),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn metadata_from_json(value: Option<Value>) -> Metadata {
    match value {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
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

/// Stored spellings a transition may start from, legacy values included.
fn permitted_prior_values(transition: &StatusTransition) -> Vec<String> {
    let mut values = Vec::new();
    for status in PaymentStatus::all() {
        if transition.permits(status) {
            values.push(status.as_str().to_string());
            if status == PaymentStatus::Completed {
                values.push("succeeded".to_string());
            }
        }
    }
    values
}

fn is_gateway_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(GATEWAY_TXN_KEY),
        _ => false,
    }
}

#[async_trait]
impl PaymentTransactionRepository for PostgresPaymentTransactionRepository {
    async fn find_by_id(
        &self,
        id: &PaymentTransactionId,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        // Ids that are not UUIDs cannot exist in this table.
        let Some(uuid) = id.to_uuid() else {
            return Ok(None);
        };

        let row: Option<PaymentTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_transactions WHERE id = $1",
            COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("fetch payment transaction", e))?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_terminal(
        &self,
        payment_gateway_id: &str,
        gateway_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let row: Option<PaymentTransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE payment_gateway_id = $1
              AND gateway_transaction_id = $2
              AND status IN ('COMPLETED', 'succeeded')
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(payment_gateway_id)
        .bind(gateway_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("check terminal payment transaction", e))?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn create(&self, transaction: NewPaymentTransaction) -> Result<CreateOutcome, DomainError> {
        let wallet_uuid = parse_uuid("target_wallet_id", transaction.target_wallet_id.as_str())?;
        let user_uuid = transaction
            .user_id
            .as_ref()
            .map(|id| parse_uuid("user_id", id.as_str()))
            .transpose()?;

        let result: Result<PaymentTransactionRow, sqlx::Error> = sqlx::query_as(&format!(
            r#"
            INSERT INTO payment_transactions (
                id, user_id, target_wallet_id, payment_gateway_id, gateway_transaction_id,
                tokens_to_award, status, amount_requested_fiat, currency_requested_fiat,
                metadata_json
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_uuid)
        .bind(wallet_uuid)
        .bind(&transaction.payment_gateway_id)
        .bind(&transaction.gateway_transaction_id)
        .bind(transaction.tokens_to_award)
        .bind(transaction.status.as_str())
        .bind(transaction.amount_requested_fiat)
        .bind(&transaction.currency)
        .bind(Value::Object(transaction.metadata.clone()))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(CreateOutcome::Created(row.try_into()?)),
            Err(e) if is_gateway_key_violation(&e) => {
                tracing::info!(
                    gateway_transaction_id = ?transaction.gateway_transaction_id,
                    "Payment transaction already exists for gateway transaction"
                );
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(database_error("insert payment transaction", e)),
        }
    }

    async fn transition_status(
        &self,
        id: &PaymentTransactionId,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, DomainError> {
        let Some(uuid) = id.to_uuid() else {
            return Ok(TransitionOutcome::NotFound);
        };

        let row: Option<PaymentTransactionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payment_transactions SET
                status = $2,
                gateway_transaction_id = COALESCE($3, gateway_transaction_id),
                metadata_json = COALESCE(metadata_json, '{{}}'::jsonb) || $4,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(uuid)
        .bind(transition.to.as_str())
        .bind(&transition.gateway_transaction_id)
        .bind(Value::Object(transition.metadata.clone()))
        .bind(permitted_prior_values(&transition))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("update payment transaction status", e))?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Updated(row.try_into()?));
        }

        Ok(match self.current_status(uuid).await? {
            Some(current) => TransitionOutcome::Conflict { current },
            None => TransitionOutcome::NotFound,
        })
    }

    async fn record_failure(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<FailureRecordOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("begin transaction", e))?;

        // A live row takes precedence over earlier failure records.
        let existing: Option<PaymentTransactionRow> = match &transaction.gateway_transaction_id {
            Some(gateway_tx) => sqlx::query_as(&format!(
                r#"
                SELECT {} FROM payment_transactions
                WHERE payment_gateway_id = $1 AND gateway_transaction_id = $2
                ORDER BY (status <> 'FAILED') DESC, updated_at DESC
                LIMIT 1
                FOR UPDATE
                "#,
                COLUMNS
            ))
            .bind(&transaction.payment_gateway_id)
            .bind(gateway_tx)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| database_error("lock payment transaction", e))?,
            None => None,
        };

        let row: PaymentTransactionRow = match existing {
            Some(row) => {
                let current: PaymentTransaction = row.try_into()?;
                if let Some(untouched) = FailureRecordOutcome::guard(&current) {
                    return Ok(untouched);
                }
                let uuid = parse_uuid("id", current.id.as_str())?;

                sqlx::query_as(&format!(
                    r#"
                    UPDATE payment_transactions SET
                        status = 'FAILED',
                        metadata_json = COALESCE(metadata_json, '{{}}'::jsonb) || $2,
                        amount_requested_fiat = COALESCE($3, amount_requested_fiat),
                        currency_requested_fiat = COALESCE($4, currency_requested_fiat),
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    COLUMNS
                ))
                .bind(uuid)
                .bind(Value::Object(transaction.metadata.clone()))
                .bind(transaction.amount_requested_fiat)
                .bind(&transaction.currency)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| database_error("mark payment transaction failed", e))?
            }
            None => {
                let wallet_uuid =
                    parse_uuid("target_wallet_id", transaction.target_wallet_id.as_str())?;
                let user_uuid = transaction
                    .user_id
                    .as_ref()
                    .map(|id| parse_uuid("user_id", id.as_str()))
                    .transpose()?;

                sqlx::query_as(&format!(
                    r#"
                    INSERT INTO payment_transactions (
                        id, user_id, target_wallet_id, payment_gateway_id, gateway_transaction_id,
                        tokens_to_award, status, amount_requested_fiat, currency_requested_fiat,
                        metadata_json
                    ) VALUES ($1, $2, $3, $4, $5, $6, 'FAILED', $7, $8, $9)
                    RETURNING {}
                    "#,
                    COLUMNS
                ))
                .bind(Uuid::new_v4())
                .bind(user_uuid)
                .bind(wallet_uuid)
                .bind(&transaction.payment_gateway_id)
                .bind(&transaction.gateway_transaction_id)
                .bind(transaction.tokens_to_award)
                .bind(transaction.amount_requested_fiat)
                .bind(&transaction.currency)
                .bind(Value::Object(transaction.metadata.clone()))
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| database_error("insert failed payment transaction", e))?
            }
        };

        tx.commit()
            .await
            .map_err(|e| database_error("commit failure record", e))?;

        Ok(FailureRecordOutcome::Recorded(row.try_into()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(status: &str) -> PaymentTransactionRow {
        PaymentTransactionRow {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            target_wallet_id: Uuid::new_v4(),
            payment_gateway_id: "stripe".to_string(),
            gateway_transaction_id: Some("in_1".to_string()),
            tokens_to_award: 500,
            status: status.to_string(),
            amount_requested_fiat: Some(20.0),
            currency_requested_fiat: Some("usd".to_string()),
            metadata_json: Some(json!({ "type": "RENEWAL" })),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_domain() {
        let transaction = PaymentTransaction::try_from(row("PROCESSING_RENEWAL")).unwrap();

        assert_eq!(transaction.status, PaymentStatus::ProcessingRenewal);
        assert_eq!(transaction.tokens_to_award, 500);
        assert_eq!(transaction.metadata_str("type"), Some("RENEWAL"));
    }

    #[test]
    fn legacy_succeeded_reads_as_completed() {
        let transaction = PaymentTransaction::try_from(row("succeeded")).unwrap();
        assert_eq!(transaction.status, PaymentStatus::Completed);
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let err = PaymentTransaction::try_from(row("REFUNDED")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn non_object_metadata_reads_as_empty() {
        let mut stored = row("PENDING");
        stored.metadata_json = Some(json!(["unexpected"]));

        let transaction = PaymentTransaction::try_from(stored).unwrap();

        assert!(transaction.metadata.is_empty());
    }

    #[test]
    fn legacy_spelling_is_permitted_wherever_completed_is() {
        let compensate = StatusTransition::to(PaymentStatus::TokenAwardFailed)
            .from_any_of(&[PaymentStatus::Completed]);
        assert_eq!(
            permitted_prior_values(&compensate),
            vec!["COMPLETED".to_string(), "succeeded".to_string()]
        );

        let finalize = StatusTransition::to(PaymentStatus::Completed)
            .from_any_of(&[PaymentStatus::ProcessingRenewal]);
        assert_eq!(permitted_prior_values(&finalize), vec!["PROCESSING_RENEWAL".to_string()]);
    }

    #[test]
    fn unrestricted_transition_follows_the_state_machine() {
        let fail = StatusTransition::to(PaymentStatus::Failed);
        assert_eq!(
            permitted_prior_values(&fail),
            vec!["PENDING".to_string(), "PROCESSING_RENEWAL".to_string()]
        );
    }

    #[test]
    fn non_uuid_wallet_is_rejected() {
        let err = parse_uuid("target_wallet_id", "wallet_1").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
