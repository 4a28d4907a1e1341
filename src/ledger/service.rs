//! Ledger facade
//!
//! The operations an outer caller (CLI, HTTP layer, embedder) uses. Built once
//! from the process configuration and shared behind an `Arc`.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::error::LedgerError;
use super::executor::TransferExecutor;
use super::mutator::BalanceMutator;
use super::query::QueryService;
use super::types::{
    BalanceView, Merchant, MerchantView, Transfer, TransferFilter, TransferOutcome,
    TransferRequest,
};
use super::validation::Limits;
use crate::config::{ConfigError, LedgerConfig};
use crate::fee::FeePolicy;
use crate::money;
use crate::persistence::{LedgerStore, MerchantStore, UnitOfWork};

pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    limits: Limits,
    executor: TransferExecutor<S>,
    query: QueryService<S>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limits = config.limits();
        let fees = config.fee_policy()?;

        info!(
            backend = store.name(),
            fee_percent = %fees.percent(),
            "Ledger ready"
        );

        Ok(Self {
            executor: TransferExecutor::new(
                store.clone(),
                fees,
                limits,
                config.idempotency_retries,
            ),
            query: QueryService::new(store.clone(), limits, config.page_limits()),
            store,
            limits,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        self.executor.fee_policy()
    }

    /// Create a merchant, optionally funded in one currency.
    ///
    /// A zero `initial_balance` creates no balance row; the first credit does.
    ///
    /// # Errors
    /// * `AlreadyExists` - name taken
    /// * `InvalidAmount` - `initial_balance < 0`
    /// * `InvalidRequest` - malformed name, currency or amount scale
    pub async fn create_merchant(
        &self,
        name: &str,
        currency: &str,
        initial_balance: Decimal,
    ) -> Result<Merchant, LedgerError> {
        self.limits.merchant_name(name)?;
        self.limits.currency(currency)?;
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "initial balance cannot be negative: {}",
                initial_balance
            )));
        }
        money::check_representable(initial_balance)?;

        let mut uow = self.store.begin().await?;
        let merchant = match uow.insert_merchant(name).await {
            Ok(m) => m,
            Err(e) => {
                warn!(merchant = name, "Merchant creation rejected: {}", e);
                return Err(e);
            }
        };
        if initial_balance > Decimal::ZERO {
            BalanceMutator::credit(&mut uow, name, currency, initial_balance).await?;
        }
        uow.commit().await?;

        info!(
            merchant = name,
            currency,
            initial_balance = %initial_balance,
            "Merchant created"
        );
        Ok(merchant)
    }

    pub async fn get_merchant(&self, name: &str) -> Result<MerchantView, LedgerError> {
        self.query.get_merchant(name).await
    }

    pub async fn get_balance(
        &self,
        name: &str,
        currency: Option<&str>,
    ) -> Result<BalanceView, LedgerError> {
        self.query.get_balance(name, currency).await
    }

    pub async fn execute_transfer(
        &self,
        req: &TransferRequest,
    ) -> Result<TransferOutcome, LedgerError> {
        self.executor.execute(req).await
    }

    pub async fn list_transfers(
        &self,
        filter: &TransferFilter,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.query.list_transfers(filter).await
    }
}
