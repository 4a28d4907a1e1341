//! Store traits for ledger data access
//!
//! Every read and write happens through a [`UnitOfWork`]: one database
//! transaction (or its in-memory equivalent). The per-entity traits are
//! implemented by the unit of work so that the executor can drive a Postgres
//! transaction and an in-memory fake through the same code.
//!
//! Contract shared by all implementations:
//! - Writes become visible to other units only on [`UnitOfWork::commit`].
//! - Dropping a unit without committing discards its writes and releases its
//!   locks.
//! - Uniqueness of merchant names, balance pairs and idempotency keys is
//!   enforced by the store, not by callers checking first.

use async_trait::async_trait;

use crate::ledger::types::{
    Balance, Merchant, NewTransfer, Transfer, TransferFilter, TransferId, TransferReceipt,
};
use crate::ledger::LedgerError;

// ============================================================================
// Merchant Store
// ============================================================================

#[async_trait]
pub trait MerchantStore: Send {
    /// Insert a merchant; `AlreadyExists` if the name is taken
    async fn insert_merchant(&mut self, name: &str) -> Result<Merchant, LedgerError>;

    async fn find_merchant(&mut self, name: &str) -> Result<Option<Merchant>, LedgerError>;
}

// ============================================================================
// Balance Store
// ============================================================================

#[async_trait]
pub trait BalanceStore: Send {
    /// Plain read, no lock
    async fn find_balance(
        &mut self,
        merchant: &str,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError>;

    /// All balances of a merchant ordered by currency
    async fn balances_of(&mut self, merchant: &str) -> Result<Vec<Balance>, LedgerError>;

    /// Read the (merchant, currency) row under an exclusive row lock.
    ///
    /// The lock is held until the unit of work ends. Locking a row this unit
    /// already holds returns immediately.
    async fn lock_balance(
        &mut self,
        merchant: &str,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError>;

    /// Create a row. Returns `false` (and changes nothing) if a row for the
    /// pair already exists, including one committed concurrently.
    async fn insert_balance(&mut self, balance: &Balance) -> Result<bool, LedgerError>;

    /// Overwrite the amount of a row previously returned by `lock_balance`
    async fn store_balance(&mut self, balance: &Balance) -> Result<(), LedgerError>;
}

// ============================================================================
// Transfer Store
// ============================================================================

#[async_trait]
pub trait TransferStore: Send {
    /// Insert a transfer; `DuplicateKey` if its idempotency key is taken
    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> Result<Transfer, LedgerError>;

    /// Filtered page, most recent first. `filter.limit` is already resolved.
    async fn list_transfers(&mut self, filter: &TransferFilter)
    -> Result<Vec<Transfer>, LedgerError>;
}

// ============================================================================
// Idempotency Store
// ============================================================================

#[async_trait]
pub trait IdempotencyStore: Send {
    async fn find_receipt(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<TransferReceipt>, LedgerError>;

    /// Record the snapshot for a key; `DuplicateKey` if the key is taken
    async fn insert_receipt(
        &mut self,
        idempotency_key: &str,
        transfer_id: TransferId,
        receipt: &TransferReceipt,
    ) -> Result<(), LedgerError>;
}

// ============================================================================
// Unit of Work / Store
// ============================================================================

/// One atomic unit over all four record sets
#[async_trait]
pub trait UnitOfWork: MerchantStore + BalanceStore + TransferStore + IdempotencyStore {
    /// Make all writes visible atomically and release locks.
    ///
    /// An error means nothing was committed.
    async fn commit(self) -> Result<(), LedgerError>;

    /// Discard all writes and release locks
    async fn rollback(self) -> Result<(), LedgerError>;
}

/// Ledger persistence backend
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Unit: UnitOfWork + 'static;

    /// Short backend name for logging
    fn name(&self) -> &'static str;

    async fn begin(&self) -> Result<Self::Unit, LedgerError>;
}
