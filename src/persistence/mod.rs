// Ledger persistence: store traits plus Postgres and in-memory backends
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod schema;

pub use memory::{MemoryLedgerStore, MemoryUnitOfWork};
pub use postgres::{PgLedgerStore, PgUnitOfWork};
pub use repository::{
    BalanceStore, IdempotencyStore, LedgerStore, MerchantStore, TransferStore, UnitOfWork,
};
pub use schema::init_schema;
