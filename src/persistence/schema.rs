use sqlx::PgPool;

use crate::ledger::LedgerError;

/// Initialize the ledger schema. Safe to run repeatedly.
pub async fn init_schema(pool: &PgPool) -> Result<(), LedgerError> {
    tracing::info!("Initializing ledger schema...");

    for (name, ddl) in SCHEMA {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            LedgerError::DatabaseError(format!("Failed to create {}: {}", name, e))
        })?;
        tracing::debug!("Schema object ready: {}", name);
    }

    tracing::info!("Ledger schema initialized successfully");
    Ok(())
}

/// Ordered DDL: referenced tables first
pub const SCHEMA: &[(&str, &str)] = &[
    ("merchants", CREATE_MERCHANTS_TABLE),
    ("balances", CREATE_BALANCES_TABLE),
    ("transfers", CREATE_TRANSFERS_TABLE),
    ("idx_transfers_created_at", CREATE_TRANSFERS_CREATED_INDEX),
    ("idx_transfers_filters", CREATE_TRANSFERS_FILTER_INDEX),
    ("idempotency_keys", CREATE_IDEMPOTENCY_KEYS_TABLE),
];

// =============================================================================
// Tables
// =============================================================================
//
// Every monetary column is NUMERIC(20, 8). Never use REAL/DOUBLE for money.

pub const CREATE_MERCHANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS merchants (
    id          BIGSERIAL PRIMARY KEY,
    name        VARCHAR(255) NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT merchants_name_key UNIQUE (name),
    CONSTRAINT merchants_name_not_empty CHECK (name <> '')
)
"#;

pub const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    id             BIGSERIAL PRIMARY KEY,
    merchant_name  VARCHAR(255) NOT NULL REFERENCES merchants (name),
    currency       VARCHAR(10) NOT NULL,
    amount         NUMERIC(20, 8) NOT NULL DEFAULT 0,
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT balances_merchant_currency_key UNIQUE (merchant_name, currency),
    CONSTRAINT balances_amount_non_negative CHECK (amount >= 0)
)
"#;

pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id               BIGSERIAL PRIMARY KEY,
    from_merchant    VARCHAR(255) NOT NULL REFERENCES merchants (name),
    to_merchant      VARCHAR(255) NOT NULL REFERENCES merchants (name),
    currency         VARCHAR(10) NOT NULL,
    amount           NUMERIC(20, 8) NOT NULL,
    fee              NUMERIC(20, 8) NOT NULL,
    idempotency_key  VARCHAR(255) NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT transfers_idempotency_key_key UNIQUE (idempotency_key),
    CONSTRAINT transfers_amount_positive CHECK (amount > 0),
    CONSTRAINT transfers_fee_non_negative CHECK (fee >= 0),
    CONSTRAINT transfers_distinct_merchants CHECK (from_merchant <> to_merchant)
)
"#;

pub const CREATE_TRANSFERS_CREATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transfers_created_at ON transfers (created_at DESC, id DESC)
"#;

pub const CREATE_TRANSFERS_FILTER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transfers_filters ON transfers (from_merchant, to_merchant, currency)
"#;

pub const CREATE_IDEMPOTENCY_KEYS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS idempotency_keys (
    id               BIGSERIAL PRIMARY KEY,
    idempotency_key  VARCHAR(255) NOT NULL,
    transfer_id      BIGINT NOT NULL REFERENCES transfers (id),
    response_data    JSONB NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT idempotency_keys_key UNIQUE (idempotency_key)
)
"#;
