//! mini_ledger - Merchant Ledger Core
//!
//! Per-currency merchant balances and idempotent fee-charging transfers on
//! top of PostgreSQL, with an in-memory store for tests and embedding.
//!
//! # Modules
//!
//! - [`ledger`] - Transfer executor, balance mutator, queries and the [`Ledger`] facade
//! - [`persistence`] - Store traits, Postgres and in-memory backends, schema
//! - [`fee`] - Percentage fee policy
//! - [`money`] - Amount parsing and formatting
//! - [`config`] - YAML configuration with env overrides
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool

pub mod config;
pub mod db;
pub mod fee;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod persistence;

// Convenient re-exports at crate root
pub use config::{AppConfig, ConfigError, LedgerConfig};
pub use fee::FeePolicy;
pub use ledger::{
    Balance, BalanceView, Ledger, LedgerError, Merchant, MerchantView, Transfer, TransferFilter,
    TransferOutcome, TransferReceipt, TransferRequest,
};
pub use persistence::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
