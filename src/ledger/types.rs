//! Ledger Core Types
//!
//! Records persisted by the ledger store and the shapes handed back to callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Surrogate key assigned by the store on insert
pub type TransferId = i64;

/// Merchant record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Merchant {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One balance row per (merchant, currency) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub merchant_name: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl Balance {
    pub fn new(merchant_name: &str, currency: &str, amount: Decimal) -> Self {
        Self {
            merchant_name: merchant_name.to_string(),
            currency: currency.to_string(),
            amount,
        }
    }

    /// Balance reported for a pair that has no row yet
    pub fn zero(merchant_name: &str, currency: &str) -> Self {
        Self::new(merchant_name, currency, Decimal::ZERO)
    }
}

/// Committed transfer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transfer {
    pub id: TransferId,
    pub from_merchant: String,
    pub to_merchant: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub fee: Decimal,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Quantity removed from the sender
    #[inline]
    pub fn total_debit(&self) -> Decimal {
        self.amount + self.fee
    }
}

/// Transfer row before the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub from_merchant: String,
    pub to_merchant: String,
    pub currency: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub idempotency_key: String,
}

/// Transfer request as handed to the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub currency: String,
    pub amount: Decimal,
    pub idempotency_key: String,
}

impl TransferRequest {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        currency: impl Into<String>,
        amount: Decimal,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            currency: currency.into(),
            amount,
            idempotency_key: idempotency_key.into(),
        }
    }
}

/// Frozen result of an executed transfer.
///
/// Stored verbatim next to the idempotency key and replayed for repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: TransferId,
    pub from_merchant: String,
    pub to_merchant: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&Transfer> for TransferReceipt {
    fn from(t: &Transfer) -> Self {
        Self {
            transfer_id: t.id,
            from_merchant: t.from_merchant.clone(),
            to_merchant: t.to_merchant.clone(),
            currency: t.currency.clone(),
            amount: t.amount,
            fee: t.fee,
            created_at: t.created_at,
        }
    }
}

/// What `execute_transfer` hands back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    #[serde(flatten)]
    pub receipt: TransferReceipt,
    pub is_duplicate: bool,
}

impl TransferOutcome {
    pub fn executed(receipt: TransferReceipt) -> Self {
        Self {
            receipt,
            is_duplicate: false,
        }
    }

    pub fn replayed(receipt: TransferReceipt) -> Self {
        Self {
            receipt,
            is_duplicate: true,
        }
    }

    /// Human-readable status line
    pub fn message(&self, idempotency_key: &str) -> String {
        if self.is_duplicate {
            format!(
                "This Idempotency-Key '{}' was already used. Returning previous transfer result.",
                idempotency_key
            )
        } else {
            "Transfer executed successfully".to_string()
        }
    }
}

/// Filters and page window for transfer listing.
///
/// `limit == None` means the configured default page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFilter {
    pub from_merchant: Option<String>,
    pub to_merchant: Option<String>,
    pub currency: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl TransferFilter {
    pub fn from_merchant(mut self, name: impl Into<String>) -> Self {
        self.from_merchant = Some(name.into());
        self
    }

    pub fn to_merchant(mut self, name: impl Into<String>) -> Self {
        self.to_merchant = Some(name.into());
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// True if `t` passes every filter that is set
    pub fn matches(&self, t: &Transfer) -> bool {
        self.from_merchant
            .as_deref()
            .is_none_or(|m| t.from_merchant == m)
            && self.to_merchant.as_deref().is_none_or(|m| t.to_merchant == m)
            && self.currency.as_deref().is_none_or(|c| t.currency == c)
    }
}

/// Merchant together with all of its balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerchantView {
    #[serde(flatten)]
    pub merchant: Merchant,
    pub balances: Vec<Balance>,
}

/// Balance lookup result: one currency, or all of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BalanceView {
    Single(Balance),
    All(Vec<Balance>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_transfer() -> Transfer {
        Transfer {
            id: 7,
            from_merchant: "alice".into(),
            to_merchant: "bob".into(),
            currency: "BTC".into(),
            amount: dec!(0.00005),
            fee: dec!(0.00000005),
            idempotency_key: "k-1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_debit() {
        assert_eq!(sample_transfer().total_debit(), dec!(0.00005005));
    }

    #[test]
    fn test_receipt_snapshot_is_stable_json() {
        let receipt = TransferReceipt::from(&sample_transfer());
        let first = serde_json::to_string(&receipt).unwrap();
        let decoded: TransferReceipt = serde_json::from_str(&first).unwrap();
        assert_eq!(decoded, receipt);
        assert_eq!(serde_json::to_string(&decoded).unwrap(), first);
        assert!(first.contains("\"fee\":\"0.00000005\""));
    }

    #[test]
    fn test_outcome_message() {
        let receipt = TransferReceipt::from(&sample_transfer());
        assert_eq!(
            TransferOutcome::executed(receipt.clone()).message("k-1"),
            "Transfer executed successfully"
        );
        assert!(
            TransferOutcome::replayed(receipt)
                .message("k-1")
                .contains("'k-1' was already used")
        );
    }

    #[test]
    fn test_filter_matches() {
        let t = sample_transfer();
        assert!(TransferFilter::default().matches(&t));
        assert!(TransferFilter::default().from_merchant("alice").matches(&t));
        assert!(!TransferFilter::default().to_merchant("alice").matches(&t));
        assert!(
            !TransferFilter::default()
                .from_merchant("alice")
                .currency("ETH")
                .matches(&t)
        );
    }
}
