//! Fee calculation
//!
//! Transfer fees are a fixed percentage of the transfer amount, computed in
//! the decimal domain and rounded half-to-even to 8 fractional digits.
//! The percent is fixed when the policy is built and never changes afterwards.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::ledger::LedgerError;
use crate::money::AMOUNT_SCALE;

/// Default transfer fee (0.1%)
pub const DEFAULT_FEE_PERCENT: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// Rounding applied to every computed fee
pub const FEE_ROUNDING: RoundingStrategy = RoundingStrategy::MidpointNearestEven;

/// Percentage fee policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    percent: Decimal,
}

impl FeePolicy {
    /// Build a policy charging `percent` percent of each transfer
    ///
    /// # Errors
    /// `InvalidAmount` if `percent` is negative
    pub fn new(percent: Decimal) -> Result<Self, LedgerError> {
        if percent < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "fee percent cannot be negative: {}",
                percent
            )));
        }
        Ok(Self { percent })
    }

    pub fn percent(&self) -> Decimal {
        self.percent
    }

    /// Calculate the fee for a transfer amount.
    ///
    /// `fee = round_half_even(amount * percent / 100, 8)`, always carried at
    /// scale 8 so that equal fees also render identically.
    ///
    /// # Example
    /// ```
    /// use mini_ledger::fee::FeePolicy;
    /// use rust_decimal::Decimal;
    /// use std::str::FromStr;
    ///
    /// let policy = FeePolicy::new(Decimal::from_str("0.1").unwrap()).unwrap();
    /// let fee = policy.calculate_fee(Decimal::from_str("0.00005").unwrap()).unwrap();
    /// assert_eq!(fee.to_string(), "0.00000005");
    /// ```
    ///
    /// # Errors
    /// `InvalidAmount` if `amount <= 0`
    pub fn calculate_fee(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be positive: {}",
                amount
            )));
        }

        let raw = amount
            .checked_mul(self.percent)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("fee overflow for {}", amount)))?;

        let mut fee = raw.round_dp_with_strategy(AMOUNT_SCALE, FEE_ROUNDING);
        fee.rescale(AMOUNT_SCALE);
        Ok(fee)
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            percent: DEFAULT_FEE_PERCENT,
        }
    }
}
