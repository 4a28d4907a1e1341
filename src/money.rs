//! Money Conversion Module
//!
//! Conversion between client-facing amount strings and the exact `Decimal`
//! representation stored by the ledger. All client amounts MUST go through
//! this module before they reach the transfer executor.
//!
//! ## Storage Representation
//! - Monetary columns are `NUMERIC(20, 8)`: 12 integer digits, 8 fractional
//! - Amounts with more than [`AMOUNT_SCALE`] fractional digits are rejected,
//!   never rounded
//!
//! ## Usage
//! ```rust
//! use mini_ledger::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("0.00005000").unwrap();
//! assert_eq!(amount.to_string(), "0.00005");
//! assert_eq!(format_amount(amount), "0.00005000");
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::ledger::LedgerError;

/// Fractional digits kept for every stored amount
pub const AMOUNT_SCALE: u32 = 8;

/// Integer digits available in `NUMERIC(20, 8)`
pub const MAX_INTEGER_DIGITS: u32 = 12;

// ============================================================================
// Parse: Client → Internal
// ============================================================================

/// Parse a client amount string into an exact decimal.
///
/// Sign is not checked here; the operation that receives the amount decides
/// whether zero or negative values are acceptable.
///
/// # Errors
/// * `InvalidRequest` - unparsable, too many fractional digits, or too large
pub fn parse_amount(amount_str: &str) -> Result<Decimal, LedgerError> {
    let trimmed = amount_str.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidRequest("amount is required".to_string()));
    }

    // Scientific notation ("1e-8") is accepted as well as plain decimals
    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| LedgerError::InvalidRequest(format!("invalid amount format: '{}'", trimmed)))?;

    check_representable(amount)?;
    Ok(amount.normalize())
}

/// Reject values the storage columns cannot hold exactly
pub fn check_representable(amount: Decimal) -> Result<(), LedgerError> {
    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(LedgerError::InvalidRequest(format!(
            "amount {} has more than {} fractional digits",
            normalized, AMOUNT_SCALE
        )));
    }

    let limit = Decimal::from(10u64.pow(MAX_INTEGER_DIGITS));
    if normalized.abs() >= limit {
        return Err(LedgerError::InvalidRequest(format!(
            "amount {} exceeds {} integer digits",
            normalized, MAX_INTEGER_DIGITS
        )));
    }

    Ok(())
}

// ============================================================================
// Format: Internal → Client
// ============================================================================

/// Render an amount with exactly [`AMOUNT_SCALE`] fractional digits
pub fn format_amount(amount: Decimal) -> String {
    let mut display = amount;
    display.rescale(AMOUNT_SCALE);
    display.to_string()
}
