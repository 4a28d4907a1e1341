//! Transfer Executor
//!
//! Runs one transfer request as one unit of work:
//!
//! ```text
//! look up key ──hit──▶ replay stored receipt
//!     │miss
//!     ▼
//! validate ─▶ fee ─▶ lock rows ─▶ debit(amount+fee) ─▶ credit(amount)
//!     ─▶ insert transfer ─▶ insert receipt ─▶ commit
//! ```
//!
//! The lookup is only a fast path. Two requests with the same key can both
//! miss it; the store's uniqueness on the key decides the winner, and the
//! loser rolls back everything and looks the key up again to replay the
//! winner's receipt.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::error::LedgerError;
use super::mutator::BalanceMutator;
use super::types::{NewTransfer, TransferOutcome, TransferReceipt, TransferRequest};
use super::validation::{self, Limits};
use crate::fee::FeePolicy;
use crate::money;
use crate::persistence::{
    BalanceStore, IdempotencyStore, LedgerStore, MerchantStore, TransferStore, UnitOfWork,
};

/// Default number of fresh lookups after losing an idempotency-key race
pub const DEFAULT_IDEMPOTENCY_RETRIES: u32 = 3;

pub struct TransferExecutor<S: LedgerStore> {
    store: Arc<S>,
    fees: FeePolicy,
    limits: Limits,
    retries: u32,
}

impl<S: LedgerStore> TransferExecutor<S> {
    pub fn new(store: Arc<S>, fees: FeePolicy, limits: Limits, retries: u32) -> Self {
        Self {
            store,
            fees,
            limits,
            retries,
        }
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.fees
    }

    /// Execute a transfer at most once per idempotency key.
    ///
    /// Returns the stored receipt with `is_duplicate = true` when the key was
    /// already used, whatever the payload of the repeat request.
    ///
    /// # Errors
    /// * `InvalidRequest` - malformed names, currency, key or amount scale
    /// * `MerchantNotFound` - unknown sender or recipient
    /// * `InvalidTransfer` - same merchant on both sides, or `amount <= 0`
    /// * `InsufficientFunds` - sender cannot cover `amount + fee`
    /// * `DatabaseError` / `SystemError` - nothing was committed
    pub async fn execute(&self, req: &TransferRequest) -> Result<TransferOutcome, LedgerError> {
        let key = self.check_shape(req)?;

        for attempt in 0..=self.retries {
            match self.try_execute(req, key).await {
                Ok(outcome) => return Ok(outcome),
                Err(LedgerError::DuplicateKey(_)) => {
                    info!(
                        idempotency_key = key,
                        attempt, "Lost idempotency race, re-probing"
                    );
                }
                Err(e) if e.is_business() => {
                    warn!(
                        from = %req.from,
                        to = %req.to,
                        currency = %req.currency,
                        amount = %req.amount,
                        idempotency_key = key,
                        code = e.code(),
                        "Transfer rejected: {}", e
                    );
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        backend = self.store.name(),
                        idempotency_key = key,
                        "Transfer rolled back: {}", e
                    );
                    return Err(e);
                }
            }
        }

        error!(
            idempotency_key = key,
            attempts = self.retries + 1,
            "Idempotency key still contended, giving up"
        );
        Err(LedgerError::SystemError(format!(
            "idempotency key '{}' could not be resolved after {} attempts",
            key,
            self.retries + 1
        )))
    }

    /// Request-shape checks that need no store access. Returns the trimmed key.
    fn check_shape<'r>(&self, req: &'r TransferRequest) -> Result<&'r str, LedgerError> {
        let key = validation::idempotency_key(&req.idempotency_key)?;
        self.limits.merchant_name(&req.from)?;
        self.limits.merchant_name(&req.to)?;
        self.limits.currency(&req.currency)?;
        money::check_representable(req.amount)?;
        Ok(key)
    }

    async fn try_execute(
        &self,
        req: &TransferRequest,
        key: &str,
    ) -> Result<TransferOutcome, LedgerError> {
        let mut uow = self.store.begin().await?;

        // 1. Idempotency lookup
        if let Some(receipt) = uow.find_receipt(key).await? {
            uow.rollback().await?;
            info!(
                idempotency_key = key,
                transfer_id = receipt.transfer_id,
                "Duplicate transfer request, replaying stored receipt"
            );
            return Ok(TransferOutcome::replayed(receipt));
        }

        // 2. Validation
        for name in [&req.from, &req.to] {
            if uow.find_merchant(name).await?.is_none() {
                return Err(LedgerError::MerchantNotFound(name.clone()));
            }
        }
        if req.from == req.to {
            return Err(LedgerError::InvalidTransfer(format!(
                "cannot transfer from '{}' to itself",
                req.from
            )));
        }
        if req.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidTransfer(format!(
                "amount must be positive: {}",
                req.amount
            )));
        }

        // 3. Fee
        let fee = self.fees.calculate_fee(req.amount)?;
        let total = req.amount.checked_add(fee).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("total debit overflow for {}", req.amount))
        })?;

        // 4. Mutation. Both rows are locked in name order first so that
        //    opposite-direction transfers cannot deadlock.
        let mut order = [req.from.as_str(), req.to.as_str()];
        order.sort_unstable();
        for merchant in order {
            uow.lock_balance(merchant, &req.currency).await?;
        }

        // A same-key request holding these rows may have committed while we
        // waited; replay it instead of judging funds it already moved
        if let Some(receipt) = uow.find_receipt(key).await? {
            uow.rollback().await?;
            info!(
                idempotency_key = key,
                transfer_id = receipt.transfer_id,
                "Same-key transfer committed while waiting on row locks, replaying"
            );
            return Ok(TransferOutcome::replayed(receipt));
        }

        let sender = BalanceMutator::debit(&mut uow, &req.from, &req.currency, total)
            .await
            .map_err(|e| match e {
                LedgerError::NoBalance { .. } | LedgerError::InsufficientFunds { .. } => {
                    LedgerError::InsufficientFunds {
                        merchant: req.from.clone(),
                        currency: req.currency.clone(),
                        required: total,
                        fee,
                    }
                }
                other => other,
            })?;
        BalanceMutator::credit(&mut uow, &req.to, &req.currency, req.amount).await?;
        debug!(
            from = %req.from,
            remaining = %sender.amount,
            "Debit and credit applied"
        );

        let transfer = uow
            .insert_transfer(&NewTransfer {
                from_merchant: req.from.clone(),
                to_merchant: req.to.clone(),
                currency: req.currency.clone(),
                amount: req.amount,
                fee,
                idempotency_key: key.to_string(),
            })
            .await?;

        let receipt = TransferReceipt::from(&transfer);
        uow.insert_receipt(key, transfer.id, &receipt).await?;
        uow.commit().await?;

        info!(
            transfer_id = transfer.id,
            from = %transfer.from_merchant,
            to = %transfer.to_merchant,
            currency = %transfer.currency,
            amount = %transfer.amount,
            fee = %transfer.fee,
            idempotency_key = key,
            "Transfer committed"
        );
        Ok(TransferOutcome::executed(receipt))
    }
}
