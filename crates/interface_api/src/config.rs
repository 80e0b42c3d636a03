//! API configuration

use serde::Deserialize;

use core_kernel::{Currency, MoneyError};

/// Where the ledger is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local ledger, lost on restart; for demos and tests
    Memory,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Currency used by reports when the request names none
    pub currency: String,
    pub storage: StorageBackend,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/school_ledger".to_string(),
            log_level: "info".to_string(),
            currency: "KES".to_string(),
            storage: StorageBackend::Postgres,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_*` environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured default currency
    pub fn default_currency(&self) -> Result<Currency, MoneyError> {
        self.currency.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.default_currency().unwrap(), Currency::KES);
        assert_eq!(config.storage, StorageBackend::Postgres);
    }

    #[test]
    fn test_unknown_currency_is_rejected() {
        let config = ApiConfig {
            currency: "XYZ".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.default_currency().is_err());
    }
}
