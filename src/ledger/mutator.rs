//! Balance Mutator
//!
//! Locked read-modify-write on a single (merchant, currency) balance row.
//! Non-negativity is decided while the row lock is held, so a concurrent
//! mutator of the same row always observes the previous committed result.
//!
//! A row never holds [`MAX_INTEGER_DIGITS`] or more integer digits, which is
//! what a `NUMERIC(20, 8)` column can store.
//!
//! These are plain mutations: calling `debit` twice debits twice. Exactly-once
//! application is the transfer executor's job.

use rust_decimal::Decimal;
use tracing::debug;

use super::error::LedgerError;
use super::types::Balance;
use crate::money::MAX_INTEGER_DIGITS;
use crate::persistence::BalanceStore;

pub struct BalanceMutator;

impl BalanceMutator {
    /// Add `amount` to the row, creating it if the pair has none yet
    ///
    /// # Errors
    /// `InvalidAmount` if `amount < 0` or the row would outgrow its column
    pub async fn credit<S>(
        store: &mut S,
        merchant: &str,
        currency: &str,
        amount: Decimal,
    ) -> Result<Balance, LedgerError>
    where
        S: BalanceStore + ?Sized,
    {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "credit amount cannot be negative: {}",
                amount
            )));
        }

        if let Some(current) = store.lock_balance(merchant, currency).await? {
            return Self::apply(store, current, amount).await;
        }

        check_ceiling(merchant, currency, amount)?;
        let created = Balance::new(merchant, currency, amount);
        if store.insert_balance(&created).await? {
            debug!(merchant, currency, amount = %amount, "Balance row created");
            return Ok(created);
        }

        // A concurrent first credit created the row; it is committed now
        let current = store
            .lock_balance(merchant, currency)
            .await?
            .ok_or_else(|| {
                LedgerError::SystemError(format!(
                    "balance row {}/{} vanished after insert conflict",
                    merchant, currency
                ))
            })?;
        Self::apply(store, current, amount).await
    }

    /// Subtract `amount` from the row
    ///
    /// # Errors
    /// * `InvalidAmount` if `amount < 0`
    /// * `NoBalance` if the pair has no row
    /// * `InsufficientFunds` if the row would go negative
    pub async fn debit<S>(
        store: &mut S,
        merchant: &str,
        currency: &str,
        amount: Decimal,
    ) -> Result<Balance, LedgerError>
    where
        S: BalanceStore + ?Sized,
    {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "debit amount cannot be negative: {}",
                amount
            )));
        }

        let current = store
            .lock_balance(merchant, currency)
            .await?
            .ok_or_else(|| LedgerError::NoBalance {
                merchant: merchant.to_string(),
                currency: currency.to_string(),
            })?;

        if current.amount < amount {
            return Err(LedgerError::InsufficientFunds {
                merchant: merchant.to_string(),
                currency: currency.to_string(),
                required: amount,
                fee: Decimal::ZERO,
            });
        }

        Self::apply(store, current, -amount).await
    }

    async fn apply<S>(store: &mut S, mut row: Balance, delta: Decimal) -> Result<Balance, LedgerError>
    where
        S: BalanceStore + ?Sized,
    {
        let updated = row.amount.checked_add(delta).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("balance overflow for {}", row.merchant_name))
        })?;
        if updated < Decimal::ZERO {
            return Err(LedgerError::SystemError(format!(
                "balance {}/{} would become negative",
                row.merchant_name, row.currency
            )));
        }
        check_ceiling(&row.merchant_name, &row.currency, updated)?;

        row.amount = updated;
        store.store_balance(&row).await?;
        Ok(row)
    }
}

fn check_ceiling(merchant: &str, currency: &str, amount: Decimal) -> Result<(), LedgerError> {
    let ceiling = Decimal::from(10u64.pow(MAX_INTEGER_DIGITS));
    if amount.abs() >= ceiling {
        return Err(LedgerError::InvalidAmount(format!(
            "balance {}/{} would exceed {} integer digits",
            merchant, currency, MAX_INTEGER_DIGITS
        )));
    }
    Ok(())
}
