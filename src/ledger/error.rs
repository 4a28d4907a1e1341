//! Ledger Error Types
//!
//! Business rejections are expected outcomes and carry enough detail for the
//! caller to act. Everything else is an infrastructure failure.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // === Lookup Errors ===
    #[error("Merchant '{0}' not found")]
    MerchantNotFound(String),

    #[error("Merchant '{0}' already exists")]
    AlreadyExists(String),

    // === Validation Errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Balance Errors ===
    #[error(
        "Insufficient funds for '{merchant}': required {required} {currency}, including fee {fee} {currency}"
    )]
    InsufficientFunds {
        merchant: String,
        currency: String,
        required: Decimal,
        fee: Decimal,
    },

    #[error("No {currency} balance for '{merchant}'")]
    NoBalance { merchant: String, currency: String },

    // === Idempotency Errors ===
    /// Lost the race for an idempotency key; the caller looks the key up again.
    #[error("Idempotency key '{0}' already committed by a concurrent request")]
    DuplicateKey(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::MerchantNotFound(_) => "MERCHANT_NOT_FOUND",
            LedgerError::AlreadyExists(_) => "ALREADY_EXISTS",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidTransfer(_) => "INVALID_TRANSFER",
            LedgerError::InvalidRequest(_) => "INVALID_REQUEST",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::NoBalance { .. } => "NO_BALANCE",
            LedgerError::DuplicateKey(_) => "DUPLICATE_KEY",
            LedgerError::DatabaseError(_) => "DATABASE_ERROR",
            LedgerError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidTransfer(_)
            | LedgerError::InvalidRequest(_) => 400,
            LedgerError::MerchantNotFound(_) => 404,
            LedgerError::AlreadyExists(_)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::NoBalance { .. }
            | LedgerError::DuplicateKey(_) => 409,
            LedgerError::DatabaseError(_) | LedgerError::SystemError(_) => 500,
        }
    }

    /// Expected business condition (as opposed to an infrastructure failure)
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            LedgerError::DatabaseError(_) | LedgerError::SystemError(_)
        )
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::SystemError(format!("snapshot encoding: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::MerchantNotFound("alice".into()).code(),
            "MERCHANT_NOT_FOUND"
        );
        assert_eq!(
            LedgerError::DuplicateKey("k".into()).code(),
            "DUPLICATE_KEY"
        );
        assert_eq!(LedgerError::SystemError("x".into()).code(), "SYSTEM_ERROR");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::MerchantNotFound("a".into()).http_status(), 404);
        assert_eq!(LedgerError::AlreadyExists("a".into()).http_status(), 409);
        assert_eq!(LedgerError::InvalidTransfer("x".into()).http_status(), 400);
        assert_eq!(LedgerError::DatabaseError("x".into()).http_status(), 500);
    }

    #[test]
    fn test_business_vs_infrastructure() {
        assert!(LedgerError::InvalidAmount("x".into()).is_business());
        assert!(
            LedgerError::NoBalance {
                merchant: "a".into(),
                currency: "BTC".into()
            }
            .is_business()
        );
        assert!(!LedgerError::DatabaseError("boom".into()).is_business());
        assert!(!LedgerError::SystemError("boom".into()).is_business());
    }

    #[test]
    fn test_insufficient_funds_display() {
        let err = LedgerError::InsufficientFunds {
            merchant: "alice".into(),
            currency: "BTC".into(),
            required: dec!(0.0001001),
            fee: dec!(0.0000001),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds for 'alice': required 0.0001001 BTC, including fee 0.0000001 BTC"
        );
    }
}
