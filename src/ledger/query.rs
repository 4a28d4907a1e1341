//! Query Service
//!
//! Read-only lookups. Each call reads through its own unit of work and rolls
//! it back, so it only ever sees committed transfers and takes no row locks.

use std::sync::Arc;

use super::error::LedgerError;
use super::types::{Balance, BalanceView, MerchantView, Transfer, TransferFilter};
use super::validation::Limits;
use crate::persistence::{BalanceStore, LedgerStore, MerchantStore, TransferStore, UnitOfWork};

/// Page size bounds for transfer listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 100,
            max_size: 1000,
        }
    }
}

impl PageLimits {
    /// Resolve the effective page size for a request
    ///
    /// # Errors
    /// `InvalidRequest` if `limit` is 0 or above `max_size`
    pub fn resolve(&self, limit: Option<u32>) -> Result<u32, LedgerError> {
        match limit {
            None => Ok(self.default_size.min(self.max_size)),
            Some(0) => Err(LedgerError::InvalidRequest(
                "limit must be at least 1".to_string(),
            )),
            Some(l) if l > self.max_size => Err(LedgerError::InvalidRequest(format!(
                "limit {} exceeds maximum page size {}",
                l, self.max_size
            ))),
            Some(l) => Ok(l),
        }
    }
}

pub struct QueryService<S: LedgerStore> {
    store: Arc<S>,
    limits: Limits,
    pages: PageLimits,
}

impl<S: LedgerStore> QueryService<S> {
    pub fn new(store: Arc<S>, limits: Limits, pages: PageLimits) -> Self {
        Self {
            store,
            limits,
            pages,
        }
    }

    /// Merchant with all of its balances, ordered by currency
    pub async fn get_merchant(&self, name: &str) -> Result<MerchantView, LedgerError> {
        self.limits.merchant_name(name)?;

        let mut uow = self.store.begin().await?;
        let merchant = uow
            .find_merchant(name)
            .await?
            .ok_or_else(|| LedgerError::MerchantNotFound(name.to_string()))?;
        let balances = uow.balances_of(name).await?;
        uow.rollback().await?;

        Ok(MerchantView { merchant, balances })
    }

    /// One balance, or all of them when `currency` is `None`.
    ///
    /// A currency the merchant has never held reads as zero.
    pub async fn get_balance(
        &self,
        name: &str,
        currency: Option<&str>,
    ) -> Result<BalanceView, LedgerError> {
        self.limits.merchant_name(name)?;
        if let Some(c) = currency {
            self.limits.currency(c)?;
        }

        let mut uow = self.store.begin().await?;
        if uow.find_merchant(name).await?.is_none() {
            return Err(LedgerError::MerchantNotFound(name.to_string()));
        }

        let view = match currency {
            Some(c) => BalanceView::Single(
                uow.find_balance(name, c)
                    .await?
                    .unwrap_or_else(|| Balance::zero(name, c)),
            ),
            None => BalanceView::All(uow.balances_of(name).await?),
        };
        uow.rollback().await?;
        Ok(view)
    }

    /// Filtered page of transfers, most recent first
    pub async fn list_transfers(
        &self,
        filter: &TransferFilter,
    ) -> Result<Vec<Transfer>, LedgerError> {
        if let Some(m) = filter.from_merchant.as_deref() {
            self.limits.merchant_name(m)?;
        }
        if let Some(m) = filter.to_merchant.as_deref() {
            self.limits.merchant_name(m)?;
        }
        if let Some(c) = filter.currency.as_deref() {
            self.limits.currency(c)?;
        }

        let resolved = TransferFilter {
            limit: Some(self.pages.resolve(filter.limit)?),
            ..filter.clone()
        };

        let mut uow = self.store.begin().await?;
        let transfers = uow.list_transfers(&resolved).await?;
        uow.rollback().await?;
        Ok(transfers)
    }
}
