//! PostgreSQL ledger store
//!
//! One `sqlx` transaction per unit of work. Balance rows are locked with
//! `SELECT ... FOR UPDATE`, so only mutators of the same (merchant, currency)
//! pair contend. Unique constraints are the final arbiter for merchant names
//! and idempotency keys.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use super::repository::{
    BalanceStore, IdempotencyStore, LedgerStore, MerchantStore, TransferStore, UnitOfWork,
};
use crate::db::Database;
use crate::ledger::LedgerError;
use crate::ledger::types::{
    Balance, Merchant, NewTransfer, Transfer, TransferFilter, TransferId, TransferReceipt,
};

const TRANSFER_COLUMNS: &str =
    "id, from_merchant, to_merchant, currency, amount, fee, idempotency_key, created_at";

/// True if `e` is a unique-constraint violation (SQLSTATE 23505)
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres-backed ledger store
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Unit = PgUnitOfWork;

    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<PgUnitOfWork, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(PgUnitOfWork { tx })
    }
}

/// One Postgres transaction. Dropping it without commit rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MerchantStore for PgUnitOfWork {
    async fn insert_merchant(&mut self, name: &str) -> Result<Merchant, LedgerError> {
        sqlx::query_as::<_, Merchant>(
            "INSERT INTO merchants (name) VALUES ($1) RETURNING name, created_at",
        )
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(name.to_string())
            } else {
                e.into()
            }
        })
    }

    async fn find_merchant(&mut self, name: &str) -> Result<Option<Merchant>, LedgerError> {
        let merchant =
            sqlx::query_as::<_, Merchant>("SELECT name, created_at FROM merchants WHERE name = $1")
                .bind(name)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(merchant)
    }
}

#[async_trait]
impl BalanceStore for PgUnitOfWork {
    async fn find_balance(
        &mut self,
        merchant: &str,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        let balance = sqlx::query_as::<_, Balance>(
            "SELECT merchant_name, currency, amount FROM balances
             WHERE merchant_name = $1 AND currency = $2",
        )
        .bind(merchant)
        .bind(currency)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(balance)
    }

    async fn balances_of(&mut self, merchant: &str) -> Result<Vec<Balance>, LedgerError> {
        let balances = sqlx::query_as::<_, Balance>(
            "SELECT merchant_name, currency, amount FROM balances
             WHERE merchant_name = $1
             ORDER BY currency",
        )
        .bind(merchant)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(balances)
    }

    async fn lock_balance(
        &mut self,
        merchant: &str,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        let balance = sqlx::query_as::<_, Balance>(
            "SELECT merchant_name, currency, amount FROM balances
             WHERE merchant_name = $1 AND currency = $2
             FOR UPDATE",
        )
        .bind(merchant)
        .bind(currency)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(balance)
    }

    async fn insert_balance(&mut self, balance: &Balance) -> Result<bool, LedgerError> {
        // Waits on a concurrent uncommitted insert of the same pair, then
        // inserts nothing if that one committed
        let result = sqlx::query(
            "INSERT INTO balances (merchant_name, currency, amount)
             VALUES ($1, $2, $3)
             ON CONFLICT (merchant_name, currency) DO NOTHING",
        )
        .bind(&balance.merchant_name)
        .bind(&balance.currency)
        .bind(balance.amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn store_balance(&mut self, balance: &Balance) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE balances SET amount = $3, updated_at = NOW()
             WHERE merchant_name = $1 AND currency = $2",
        )
        .bind(&balance.merchant_name)
        .bind(&balance.currency)
        .bind(balance.amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::SystemError(format!(
                "balance row {}/{} missing on update",
                balance.merchant_name, balance.currency
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TransferStore for PgUnitOfWork {
    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> Result<Transfer, LedgerError> {
        let sql = format!(
            "INSERT INTO transfers (from_merchant, to_merchant, currency, amount, fee, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            TRANSFER_COLUMNS
        );
        sqlx::query_as::<_, Transfer>(&sql)
            .bind(&transfer.from_merchant)
            .bind(&transfer.to_merchant)
            .bind(&transfer.currency)
            .bind(transfer.amount)
            .bind(transfer.fee)
            .bind(&transfer.idempotency_key)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DuplicateKey(transfer.idempotency_key.clone())
                } else {
                    e.into()
                }
            })
    }

    async fn list_transfers(
        &mut self,
        filter: &TransferFilter,
    ) -> Result<Vec<Transfer>, LedgerError> {
        // LIMIT NULL means no limit
        let sql = format!(
            "SELECT {} FROM transfers
             WHERE ($1::VARCHAR IS NULL OR from_merchant = $1)
               AND ($2::VARCHAR IS NULL OR to_merchant = $2)
               AND ($3::VARCHAR IS NULL OR currency = $3)
             ORDER BY created_at DESC, id DESC
             LIMIT $4 OFFSET $5",
            TRANSFER_COLUMNS
        );
        let transfers = sqlx::query_as::<_, Transfer>(&sql)
            .bind(filter.from_merchant.as_deref())
            .bind(filter.to_merchant.as_deref())
            .bind(filter.currency.as_deref())
            .bind(filter.limit.map(i64::from))
            .bind(i64::from(filter.offset))
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(transfers)
    }
}

#[async_trait]
impl IdempotencyStore for PgUnitOfWork {
    async fn find_receipt(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<TransferReceipt>, LedgerError> {
        let snapshot = sqlx::query_scalar::<_, Json<TransferReceipt>>(
            "SELECT response_data FROM idempotency_keys WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(snapshot.map(|Json(receipt)| receipt))
    }

    async fn insert_receipt(
        &mut self,
        idempotency_key: &str,
        transfer_id: TransferId,
        receipt: &TransferReceipt,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO idempotency_keys (idempotency_key, transfer_id, response_data)
             VALUES ($1, $2, $3)",
        )
        .bind(idempotency_key)
        .bind(transfer_id)
        .bind(Json(receipt))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateKey(idempotency_key.to_string())
            } else {
                LedgerError::from(e)
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateKey("deferred unique constraint".to_string())
            } else {
                LedgerError::DatabaseError(format!("commit failed: {}", e))
            }
        })
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
