//! mini-ledger - command line caller of the ledger core
//!
//! Every command parses its arguments, calls the [`Ledger`] facade against
//! PostgreSQL and prints the result as JSON on stdout. Logs go to the
//! configured file (and stderr in text mode).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use mini_ledger::config::AppConfig;
use mini_ledger::db::Database;
use mini_ledger::money::parse_amount;
use mini_ledger::persistence::{PgLedgerStore, init_schema};
use mini_ledger::{Ledger, LedgerError, TransferFilter, TransferRequest};

#[derive(Parser, Debug)]
#[command(
    name = "mini-ledger",
    version,
    about = "Merchant ledger with idempotent, fee-charging transfers",
    after_help = "OUTPUT:\n    Results are printed to stdout as JSON.\n    Errors are printed as {\"code\", \"message\"} and exit with status 1."
)]
struct Cli {
    /// Config environment, loads config/<ENV>.yaml
    #[arg(long, short = 'e', env = "LEDGER_ENV", default_value = "dev")]
    env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the ledger tables (safe to re-run)
    InitDb,

    /// Create a merchant with an opening balance
    CreateMerchant {
        name: String,
        currency: String,
        /// Decimal string, e.g. "1.0"
        initial: String,
    },

    /// Show a merchant and all of its balances
    Merchant { name: String },

    /// Show one balance, or all balances of a merchant
    Balance {
        name: String,
        #[arg(long)]
        currency: Option<String>,
    },

    /// Transfer funds; repeating the same key replays the first result
    Transfer {
        from: String,
        to: String,
        currency: String,
        /// Decimal string, e.g. "0.00005"
        amount: String,
        #[arg(long, value_name = "IDEMPOTENCY_KEY")]
        key: String,
    },

    /// List transfers, most recent first
    Transfers {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let app_config = AppConfig::load(&cli.env)
        .with_context(|| format!("Failed to load config for env '{}'", cli.env))?;
    let _log_guard = mini_ledger::logging::init_logging(&app_config);

    match run(cli.command, &app_config).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<LedgerError>() {
            Some(ledger_err) => {
                print_json(&ErrorBody {
                    code: ledger_err.code(),
                    message: ledger_err.to_string(),
                })?;
                std::process::exit(1);
            }
            None => Err(e),
        },
    }
}

async fn run(command: Command, app_config: &AppConfig) -> Result<()> {
    let db = Database::connect(app_config.database_url()?, &app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;

    if let Command::InitDb = command {
        init_schema(db.pool()).await?;
        db.close().await;
        return print_json(&serde_json::json!({ "status": "ok" }));
    }

    let store = Arc::new(PgLedgerStore::from_database(&db));
    let ledger = Ledger::new(store, &app_config.ledger)?;

    match command {
        Command::InitDb => {}
        Command::CreateMerchant {
            name,
            currency,
            initial,
        } => {
            let merchant = ledger
                .create_merchant(&name, &currency, parse_amount(&initial)?)
                .await?;
            print_json(&merchant)?;
        }
        Command::Merchant { name } => {
            print_json(&ledger.get_merchant(&name).await?)?;
        }
        Command::Balance { name, currency } => {
            print_json(&ledger.get_balance(&name, currency.as_deref()).await?)?;
        }
        Command::Transfer {
            from,
            to,
            currency,
            amount,
            key,
        } => {
            let req = TransferRequest::new(from, to, currency, parse_amount(&amount)?, key);
            let outcome = ledger.execute_transfer(&req).await?;

            let mut body = serde_json::to_value(&outcome)?;
            body["message"] = serde_json::Value::String(outcome.message(req.idempotency_key.trim()));
            print_json(&body)?;
        }
        Command::Transfers {
            from,
            to,
            currency,
            limit,
            offset,
        } => {
            let filter = TransferFilter {
                from_merchant: from,
                to_merchant: to,
                currency,
                limit,
                offset,
            };
            print_json(&ledger.list_transfers(&filter).await?)?;
        }
    }

    db.close().await;
    Ok(())
}
