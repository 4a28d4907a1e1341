//! Merchant ledger core
//!
//! Tracks per-(merchant, currency) balances and moves funds between merchants
//! with a percentage fee.
//!
//! # Guarantees
//!
//! 1. **Non-negative balances**: checked under the row lock inside each debit
//! 2. **No lost updates**: mutators of the same balance row serialize on it
//! 3. **Exactly-once transfers**: one committed transfer per idempotency key;
//!    repeats replay the stored receipt
//!
//! # Layers
//!
//! ```text
//! Ledger ──▶ TransferExecutor ──▶ BalanceMutator ──▶ UnitOfWork (store)
//!        └─▶ QueryService ─────────────────────────▶ UnitOfWork (read-only)
//! ```

pub mod error;
pub mod executor;
pub mod mutator;
pub mod query;
pub mod service;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use error::LedgerError;
pub use executor::TransferExecutor;
pub use mutator::BalanceMutator;
pub use query::{PageLimits, QueryService};
pub use service::Ledger;
pub use types::{
    Balance, BalanceView, Merchant, MerchantView, NewTransfer, Transfer, TransferFilter,
    TransferId, TransferOutcome, TransferReceipt, TransferRequest,
};
pub use validation::{Limits, ValidationError};
