//! Connection configuration
//!
//! A [`ConnectionConfig`] names one data source. Configurations are usually
//! handed over by the application's own configuration layer (they implement
//! `Deserialize`), or read from prefixed environment variables with
//! [`ConnectionConfig::from_env`].

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::Engine;
use crate::error::ModelError;

/// Configuration loading and validation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Named connection configuration for one data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Data-source key models and queries refer to
    pub name: String,
    pub engine: Engine,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Upper bound of concurrently open connections; further acquires queue
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

impl ConnectionConfig {
    pub fn new(name: &str, engine: Engine, host: &str, database: &str) -> Self {
        Self {
            name: name.to_string(),
            engine,
            host: host.to_string(),
            port: None,
            database: database.to_string(),
            user: None,
            password: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, seconds: u64) -> Self {
        self.acquire_timeout_seconds = seconds;
        self
    }

    /// Port to connect to, falling back to the engine's well-known port
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    /// Load a configuration from `{PREFIX}_ENGINE`, `{PREFIX}_HOST`, ...
    ///
    /// `name` becomes the data-source key; the prefix is its upper-cased form
    /// unless one is given explicitly.
    pub fn from_env(name: &str, prefix: Option<&str>) -> Result<Self, ConfigError> {
        let prefix = prefix
            .map(|p| p.to_string())
            .unwrap_or_else(|| name.to_uppercase());
        let var = |suffix: &str| format!("{}_{}", prefix, suffix);

        let engine_raw = get_env_required(&var("ENGINE"))?;
        let engine = Engine::from_str(&engine_raw).map_err(|_| ConfigError::InvalidValue {
            field: var("ENGINE"),
            value: engine_raw.clone(),
            expected: "mysql, mssql or postgres".to_string(),
        })?;

        let port = match get_env_optional(&var("PORT")) {
            Some(raw) => Some(parse_env(&var("PORT"), &raw, "a port number")?),
            None => None,
        };
        let max_connections = match get_env_optional(&var("MAX_CONNECTIONS")) {
            Some(raw) => parse_env(&var("MAX_CONNECTIONS"), &raw, "a positive integer")?,
            None => default_max_connections(),
        };
        let acquire_timeout_seconds = match get_env_optional(&var("ACQUIRE_TIMEOUT")) {
            Some(raw) => parse_env(&var("ACQUIRE_TIMEOUT"), &raw, "a number of seconds")?,
            None => default_acquire_timeout(),
        };

        let config = Self {
            name: name.to_string(),
            engine,
            host: get_env_or_default(&var("HOST"), "localhost"),
            port,
            database: get_env_required(&var("DATABASE"))?,
            user: get_env_optional(&var("USER")),
            password: get_env_optional(&var("PASSWORD")),
            max_connections,
            acquire_timeout_seconds,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "name".to_string(),
                reason: "Connection name cannot be empty".to_string(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "host".to_string(),
                reason: "Host cannot be empty".to_string(),
            });
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "database".to_string(),
                reason: "Database name cannot be empty".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_connections".to_string(),
                reason: "Pool must allow at least one connection".to_string(),
            });
        }
        Ok(())
    }
}

fn get_env_required(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingEnvVar {
        var: var.to_string(),
    })
}

fn get_env_optional(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn get_env_or_default(var: &str, default: &str) -> String {
    get_env_optional(var).unwrap_or_else(|| default.to_string())
}

fn parse_env<T: FromStr>(var: &str, raw: &str, expected: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        field: var.to_string(),
        value: raw.to_string(),
        expected: expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        env::set_var("CFGTEST_MAIN_ENGINE", "postgres");
        env::set_var("CFGTEST_MAIN_HOST", "db.internal");
        env::set_var("CFGTEST_MAIN_PORT", "6543");
        env::set_var("CFGTEST_MAIN_DATABASE", "app");
        env::set_var("CFGTEST_MAIN_USER", "svc");

        let config = ConnectionConfig::from_env("main", Some("CFGTEST_MAIN")).unwrap();
        assert_eq!(config.engine, Engine::Postgres);
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.effective_port(), 6543);
        assert_eq!(config.user.as_deref(), Some("svc"));
        assert_eq!(config.password, None);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_from_env_rejects_unknown_engine() {
        env::set_var("CFGTEST_BAD_ENGINE", "oracle");
        env::set_var("CFGTEST_BAD_DATABASE", "app");

        let err = ConnectionConfig::from_env("bad", Some("CFGTEST_BAD")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_database_is_reported() {
        env::set_var("CFGTEST_NODB_ENGINE", "mysql");
        let err = ConnectionConfig::from_env("nodb", Some("CFGTEST_NODB")).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnvVar {
                var: "CFGTEST_NODB_DATABASE".to_string()
            }
        );
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: ConnectionConfig = serde_json::from_value(serde_json::json!({
            "name": "reporting",
            "engine": "mssql",
            "host": "sql01",
            "database": "reports"
        }))
        .unwrap();

        assert_eq!(config.engine, Engine::MsSql);
        assert_eq!(config.effective_port(), 1433);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_seconds, 30);
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let config = ConnectionConfig::new("main", Engine::MySql, "localhost", "app").with_max_connections(0);
        assert!(config.validate().is_err());
    }
}
