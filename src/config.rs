use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;

use crate::fee::{DEFAULT_FEE_PERCENT, FeePolicy};
use crate::ledger::executor::DEFAULT_IDEMPOTENCY_RETRIES;
use crate::ledger::query::PageLimits;
use crate::ledger::validation::Limits;

/// Env var overriding `postgres_url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Env var overriding `ledger.fee_percent`
pub const FEE_PERCENT_ENV: &str = "LEDGER_FEE_PERCENT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    /// Transfer fee in percent, kept as a string so YAML never turns it into a float
    pub fee_percent: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_name_len: usize,
    pub max_currency_len: usize,
    /// Fresh key lookups after losing an idempotency-key race
    pub idempotency_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_percent: DEFAULT_FEE_PERCENT.to_string(),
            default_page_size: 100,
            max_page_size: 1000,
            max_name_len: 255,
            max_currency_len: 10,
            idempotency_retries: DEFAULT_IDEMPOTENCY_RETRIES,
        }
    }
}

impl LedgerConfig {
    pub fn fee_percent(&self) -> Result<Decimal, ConfigError> {
        Decimal::from_str(self.fee_percent.trim()).map_err(|e| ConfigError::Invalid {
            field: "ledger.fee_percent",
            reason: format!("'{}' is not a decimal: {}", self.fee_percent, e),
        })
    }

    pub fn fee_policy(&self) -> Result<FeePolicy, ConfigError> {
        FeePolicy::new(self.fee_percent()?).map_err(|e| ConfigError::Invalid {
            field: "ledger.fee_percent",
            reason: e.to_string(),
        })
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_name_len: self.max_name_len,
            max_currency_len: self.max_currency_len,
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_size: self.default_page_size,
            max_size: self.max_page_size,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fee_policy()?;
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "ledger.max_page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid {
                field: "ledger.default_page_size",
                reason: format!("must be within 1..={}", self.max_page_size),
            });
        }
        if self.max_name_len == 0 || self.max_currency_len == 0 {
            return Err(ConfigError::Invalid {
                field: "ledger.max_name_len",
                reason: "length limits must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, apply env overrides and validate
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.postgres_url = Some(url);
        }
        if let Some(percent) = lookup(FEE_PERCENT_ENV).filter(|v| !v.trim().is_empty()) {
            self.ledger.fee_percent = percent;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.rotation.as_str(), "hourly" | "daily" | "never") {
            return Err(ConfigError::Invalid {
                field: "rotation",
                reason: format!("expected hourly, daily or never, got '{}'", self.rotation),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "database.max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        self.ledger.validate()
    }

    /// Connection URL, required by every database-backed command
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.postgres_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid {
                field: "postgres_url",
                reason: format!("not configured (set it in yaml or {})", DATABASE_URL_ENV),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.ledger.fee_percent().unwrap(), dec!(0.1));
        assert_eq!(config.ledger.default_page_size, 100);
        assert_eq!(config.ledger.max_page_size, 1000);
        assert_eq!(config.ledger.idempotency_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_ledger_section() {
        let yaml = format!("{}ledger:\n  fee_percent: \"0.25\"\n", MINIMAL);
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.ledger.fee_percent().unwrap(), dec!(0.25));
        assert_eq!(config.ledger.max_name_len, 255);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (DATABASE_URL_ENV, "postgresql://ledger@localhost/ledger"),
            (FEE_PERCENT_ENV, "0.5"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(
            config.database_url().unwrap(),
            "postgresql://ledger@localhost/ledger"
        );
        assert_eq!(config.ledger.fee_percent().unwrap(), dec!(0.5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        config.ledger.fee_percent = "-1".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "ledger.fee_percent",
                ..
            })
        ));

        let mut config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        config.ledger.fee_percent = "ten".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        config.ledger.max_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        config.rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        assert!(config.database_url().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            AppConfig::from_yaml_str("log_level: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            AppConfig::load("does-not-exist"),
            Err(ConfigError::Read { .. })
        ));
    }
}
