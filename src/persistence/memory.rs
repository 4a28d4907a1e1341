//! In-memory ledger store
//!
//! Same contract as the Postgres store, without a database:
//! - Row locks are per-key async mutexes (balance pair, idempotency key,
//!   merchant name), held by the unit of work until it ends.
//! - Writes are staged in the unit and published under one write lock on
//!   commit, so readers never see half a transfer.
//! - Dropping a unit releases its locks and discards its writes. A lock
//!   entry nobody else holds or waits on is removed from the map then.
//! - Amounts are stored at [`AMOUNT_SCALE`], as a `NUMERIC(20, 8)` column
//!   returns them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::repository::{
    BalanceStore, IdempotencyStore, LedgerStore, MerchantStore, TransferStore, UnitOfWork,
};
use crate::ledger::LedgerError;
use crate::ledger::types::{
    Balance, Merchant, NewTransfer, Transfer, TransferFilter, TransferId, TransferReceipt,
};
use crate::money::AMOUNT_SCALE;

type BalanceKey = (String, String);

fn at_scale(mut amount: Decimal) -> Decimal {
    amount.rescale(AMOUNT_SCALE);
    amount
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Merchant(String),
    Balance(String, String),
    Idempotency(String),
}

#[derive(Debug, Clone)]
struct StoredReceipt {
    transfer_id: TransferId,
    snapshot: serde_json::Value,
}

#[derive(Debug, Default)]
struct Tables {
    merchants: HashMap<String, Merchant>,
    balances: BTreeMap<BalanceKey, Decimal>,
    transfers: Vec<Transfer>,
    transfer_keys: HashMap<String, usize>,
    receipts: HashMap<String, StoredReceipt>,
}

#[derive(Debug, Default)]
struct Staged {
    merchants: HashMap<String, Merchant>,
    balances: BTreeMap<BalanceKey, Decimal>,
    transfers: Vec<Transfer>,
    receipts: HashMap<String, StoredReceipt>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.merchants.is_empty()
            && self.balances.is_empty()
            && self.transfers.is_empty()
            && self.receipts.is_empty()
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: DashMap<LockKey, Arc<Mutex<()>>>,
    next_transfer_id: AtomicI64,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, LedgerError> {
        self.tables
            .read()
            .map_err(|_| LedgerError::SystemError("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, LedgerError> {
        self.tables
            .write()
            .map_err(|_| LedgerError::SystemError("memory store lock poisoned".to_string()))
    }

    fn row_lock(&self, key: &LockKey) -> Arc<Mutex<()>> {
        self.row_locks.entry(key.clone()).or_default().value().clone()
    }

    /// Drop the entry for `key` unless another unit holds or awaits it.
    /// The count is checked under the shard lock, so it cannot race `row_lock`.
    fn release_row_lock(&self, key: &LockKey) {
        self.row_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn publish(&self, staged: Staged) -> Result<(), LedgerError> {
        let mut tables = self.write()?;
        tables.merchants.extend(staged.merchants);
        tables.balances.extend(staged.balances);
        for transfer in staged.transfers {
            let idx = tables.transfers.len();
            tables
                .transfer_keys
                .insert(transfer.idempotency_key.clone(), idx);
            tables.transfers.push(transfer);
        }
        tables.receipts.extend(staged.receipts);
        Ok(())
    }
}

/// In-process ledger store
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed amount of a balance row
    pub fn balance_of(&self, merchant: &str, currency: &str) -> Option<Decimal> {
        let key = (merchant.to_string(), currency.to_string());
        self.shared
            .tables
            .read()
            .ok()
            .and_then(|t| t.balances.get(&key).copied())
    }

    /// Number of committed transfer records
    pub fn transfer_count(&self) -> usize {
        self.shared
            .tables
            .read()
            .map(|t| t.transfers.len())
            .unwrap_or_default()
    }

    /// Number of row lock entries currently tracked
    pub fn row_lock_count(&self) -> usize {
        self.shared.row_locks.len()
    }

    /// Number of committed idempotency records
    pub fn receipt_count(&self) -> usize {
        self.shared
            .tables
            .read()
            .map(|t| t.receipts.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Unit = MemoryUnitOfWork;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<MemoryUnitOfWork, LedgerError> {
        Ok(MemoryUnitOfWork {
            shared: self.shared.clone(),
            held: HashMap::new(),
            staged: Staged::default(),
        })
    }
}

/// Unit of work over [`MemoryLedgerStore`]
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    held: HashMap<LockKey, OwnedMutexGuard<()>>,
    staged: Staged,
}

impl MemoryUnitOfWork {
    /// Block until this unit owns `key`. Re-entrant within the unit.
    async fn acquire(&mut self, key: LockKey) {
        if self.held.contains_key(&key) {
            return;
        }
        let row_lock = self.shared.row_lock(&key);
        let guard = row_lock.lock_owned().await;
        self.held.insert(key, guard);
    }

    fn merchant(&self, name: &str) -> Result<Option<Merchant>, LedgerError> {
        if let Some(m) = self.staged.merchants.get(name) {
            return Ok(Some(m.clone()));
        }
        Ok(self.shared.read()?.merchants.get(name).cloned())
    }

    fn balance(&self, merchant: &str, currency: &str) -> Result<Option<Balance>, LedgerError> {
        let key = (merchant.to_string(), currency.to_string());
        let amount = match self.staged.balances.get(&key) {
            Some(amount) => Some(*amount),
            None => self.shared.read()?.balances.get(&key).copied(),
        };
        Ok(amount.map(|a| Balance::new(merchant, currency, a)))
    }

    fn transfer_by_key(&self, key: &str) -> Result<Option<Transfer>, LedgerError> {
        if let Some(t) = self.staged.transfers.iter().find(|t| t.idempotency_key == key) {
            return Ok(Some(t.clone()));
        }
        let tables = self.shared.read()?;
        Ok(tables
            .transfer_keys
            .get(key)
            .and_then(|idx| tables.transfers.get(*idx))
            .cloned())
    }

    fn receipt(&self, key: &str) -> Result<Option<StoredReceipt>, LedgerError> {
        if let Some(r) = self.staged.receipts.get(key) {
            return Ok(Some(r.clone()));
        }
        Ok(self.shared.read()?.receipts.get(key).cloned())
    }
}

#[async_trait]
impl MerchantStore for MemoryUnitOfWork {
    async fn insert_merchant(&mut self, name: &str) -> Result<Merchant, LedgerError> {
        self.acquire(LockKey::Merchant(name.to_string())).await;
        if self.merchant(name)?.is_some() {
            return Err(LedgerError::AlreadyExists(name.to_string()));
        }

        let merchant = Merchant {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.staged
            .merchants
            .insert(name.to_string(), merchant.clone());
        Ok(merchant)
    }

    async fn find_merchant(&mut self, name: &str) -> Result<Option<Merchant>, LedgerError> {
        self.merchant(name)
    }
}

#[async_trait]
impl BalanceStore for MemoryUnitOfWork {
    async fn find_balance(
        &mut self,
        merchant: &str,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        self.balance(merchant, currency)
    }

    async fn balances_of(&mut self, merchant: &str) -> Result<Vec<Balance>, LedgerError> {
        let mut by_currency: BTreeMap<String, Decimal> = self
            .shared
            .read()?
            .balances
            .iter()
            .filter(|((m, _), _)| m == merchant)
            .map(|((_, c), a)| (c.clone(), *a))
            .collect();
        for ((m, c), a) in &self.staged.balances {
            if m == merchant {
                by_currency.insert(c.clone(), *a);
            }
        }

        Ok(by_currency
            .into_iter()
            .map(|(c, a)| Balance::new(merchant, &c, a))
            .collect())
    }

    async fn lock_balance(
        &mut self,
        merchant: &str,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        self.acquire(LockKey::Balance(merchant.to_string(), currency.to_string()))
            .await;
        self.balance(merchant, currency)
    }

    async fn insert_balance(&mut self, balance: &Balance) -> Result<bool, LedgerError> {
        self.acquire(LockKey::Balance(
            balance.merchant_name.clone(),
            balance.currency.clone(),
        ))
        .await;
        if self
            .balance(&balance.merchant_name, &balance.currency)?
            .is_some()
        {
            return Ok(false);
        }

        self.staged.balances.insert(
            (balance.merchant_name.clone(), balance.currency.clone()),
            at_scale(balance.amount),
        );
        Ok(true)
    }

    async fn store_balance(&mut self, balance: &Balance) -> Result<(), LedgerError> {
        let key = LockKey::Balance(balance.merchant_name.clone(), balance.currency.clone());
        if !self.held.contains_key(&key) {
            return Err(LedgerError::SystemError(format!(
                "balance {}/{} written without its row lock",
                balance.merchant_name, balance.currency
            )));
        }
        if balance.amount < Decimal::ZERO {
            return Err(LedgerError::SystemError(format!(
                "balance {}/{} cannot be stored negative",
                balance.merchant_name, balance.currency
            )));
        }

        self.staged.balances.insert(
            (balance.merchant_name.clone(), balance.currency.clone()),
            at_scale(balance.amount),
        );
        Ok(())
    }
}

#[async_trait]
impl TransferStore for MemoryUnitOfWork {
    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> Result<Transfer, LedgerError> {
        self.acquire(LockKey::Idempotency(transfer.idempotency_key.clone()))
            .await;
        if self.transfer_by_key(&transfer.idempotency_key)?.is_some() {
            return Err(LedgerError::DuplicateKey(transfer.idempotency_key.clone()));
        }

        let id = self.shared.next_transfer_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = Transfer {
            id,
            from_merchant: transfer.from_merchant.clone(),
            to_merchant: transfer.to_merchant.clone(),
            currency: transfer.currency.clone(),
            amount: at_scale(transfer.amount),
            fee: at_scale(transfer.fee),
            idempotency_key: transfer.idempotency_key.clone(),
            created_at: Utc::now(),
        };
        self.staged.transfers.push(record.clone());
        Ok(record)
    }

    async fn list_transfers(
        &mut self,
        filter: &TransferFilter,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let mut matching: Vec<Transfer> = self
            .shared
            .read()?
            .transfers
            .iter()
            .chain(self.staged.transfers.iter())
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryUnitOfWork {
    async fn find_receipt(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<TransferReceipt>, LedgerError> {
        match self.receipt(idempotency_key)? {
            Some(stored) => Ok(Some(serde_json::from_value(stored.snapshot)?)),
            None => Ok(None),
        }
    }

    async fn insert_receipt(
        &mut self,
        idempotency_key: &str,
        transfer_id: TransferId,
        receipt: &TransferReceipt,
    ) -> Result<(), LedgerError> {
        self.acquire(LockKey::Idempotency(idempotency_key.to_string()))
            .await;
        if self.receipt(idempotency_key)?.is_some() {
            return Err(LedgerError::DuplicateKey(idempotency_key.to_string()));
        }

        self.staged.receipts.insert(
            idempotency_key.to_string(),
            StoredReceipt {
                transfer_id,
                snapshot: serde_json::to_value(receipt)?,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(mut self) -> Result<(), LedgerError> {
        let staged = std::mem::take(&mut self.staged);
        if !staged.is_empty() {
            if let Some((key, r)) = staged
                .receipts
                .iter()
                .find(|(_, r)| !staged.transfers.iter().any(|t| t.id == r.transfer_id))
            {
                return Err(LedgerError::SystemError(format!(
                    "receipt '{}' references transfer {} outside this unit",
                    key, r.transfer_id
                )));
            }
            self.shared.publish(staged)?;
        }
        // Row locks are released when `self` drops, after publication
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        debug!(locks = self.held.len(), "Memory unit rolled back");
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        for (key, guard) in self.held.drain() {
            drop(guard);
            self.shared.release_row_lock(&key);
        }
    }
}
