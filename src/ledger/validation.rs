//! Input validation for merchant names, currencies and idempotency keys
//!
//! Runs before any unit of work is opened, so malformed requests never reach
//! the transactional path.

use super::error::LedgerError;

/// Validation errors for caller-supplied identifiers
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("Invalid length for {field}: expected 1-{max}, got {actual}")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{field} must not contain control characters")]
    ControlCharacters { field: &'static str },
}

impl From<ValidationError> for LedgerError {
    fn from(e: ValidationError) -> Self {
        LedgerError::InvalidRequest(e.to_string())
    }
}

/// Length limits, taken from `LedgerConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_name_len: usize,
    pub max_currency_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_name_len: 255,
            max_currency_len: 10,
        }
    }
}

impl Limits {
    pub fn merchant_name(&self, name: &str) -> Result<(), ValidationError> {
        check_identifier("merchant_name", name, self.max_name_len)
    }

    pub fn currency(&self, currency: &str) -> Result<(), ValidationError> {
        check_identifier("currency", currency, self.max_currency_len)
    }
}

/// Trim an idempotency key; empty keys are rejected.
///
/// The key column is `VARCHAR(255)`, so longer keys are rejected too.
pub fn idempotency_key(key: &str) -> Result<&str, ValidationError> {
    let key = key.trim();
    check_identifier("idempotency_key", key, 255)?;
    Ok(key)
}

fn check_identifier(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }

    // Lengths are counted in characters, matching VARCHAR(n)
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }

    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merchant_name_bounds() {
        let limits = Limits::default();
        assert!(limits.merchant_name("alice").is_ok());
        assert!(limits.merchant_name(&"a".repeat(255)).is_ok());

        let err = limits.merchant_name(&"a".repeat(256)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLong {
                field: "merchant_name",
                max: 255,
                actual: 256
            }
        );
    }

    #[test]
    fn test_blank_rejected() {
        let limits = Limits::default();
        assert!(matches!(
            limits.merchant_name("").unwrap_err(),
            ValidationError::Empty { .. }
        ));
        assert!(matches!(
            limits.currency("   ").unwrap_err(),
            ValidationError::Empty { .. }
        ));
    }

    #[test]
    fn test_currency_length_counts_chars() {
        let limits = Limits::default();
        assert!(limits.currency("USDT").is_ok());
        assert!(limits.currency("ÉÉÉÉÉÉÉÉÉÉ").is_ok()); // 10 chars, 20 bytes
        assert!(limits.currency("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn test_control_characters_rejected() {
        let err = Limits::default().merchant_name("bob\n").unwrap_err();
        assert!(matches!(err, ValidationError::ControlCharacters { .. }));
    }

    #[test]
    fn test_idempotency_key_trimmed() {
        assert_eq!(idempotency_key("  key-1 \t").unwrap(), "key-1");
        assert!(idempotency_key(" \t ").is_err());
        assert!(idempotency_key(&"k".repeat(256)).is_err());
    }

    #[test]
    fn test_maps_to_invalid_request() {
        let err: LedgerError = ValidationError::Empty { field: "currency" }.into();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
