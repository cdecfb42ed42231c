//! Database Backend Abstractions
//!
//! This module provides the engine-facing seam of the crate: one backend per
//! supported engine (MySQL, SQL Server, PostgreSQL) behind common traits, so
//! the query builder and models never touch a driver directly.

pub mod core;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use self::core::*;
#[cfg(feature = "mssql")]
pub use mssql::MssqlBackend;
#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

use serde::{Deserialize, Serialize};

use crate::sql::SqlDialect;

/// Database engine enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "sqlserver")]
    MsSql,
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
}

impl Engine {
    /// SQL dialect spoken by this engine
    pub fn dialect(&self) -> SqlDialect {
        match self {
            Engine::MySql => SqlDialect::MySql,
            Engine::MsSql => SqlDialect::MsSql,
            Engine::Postgres => SqlDialect::Postgres,
        }
    }

    /// Well-known TCP port of this engine
    pub fn default_port(&self) -> u16 {
        match self {
            Engine::MySql => 3306,
            Engine::MsSql => 1433,
            Engine::Postgres => 5432,
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::MySql => write!(f, "mysql"),
            Engine::MsSql => write!(f, "mssql"),
            Engine::Postgres => write!(f, "postgres"),
        }
    }
}

impl std::str::FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Engine::MySql),
            "mssql" | "sqlserver" => Ok(Engine::MsSql),
            "postgres" | "postgresql" | "pg" => Ok(Engine::Postgres),
            _ => Err(format!("Unsupported database engine: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_engine_parsing_accepts_aliases() {
        assert_eq!(Engine::from_str("PostgreSQL").unwrap(), Engine::Postgres);
        assert_eq!(Engine::from_str("sqlserver").unwrap(), Engine::MsSql);
        assert_eq!(Engine::from_str("mysql").unwrap(), Engine::MySql);
        assert!(Engine::from_str("oracle").is_err());
    }

    #[test]
    fn test_engine_dialect_mapping() {
        assert_eq!(Engine::MySql.dialect(), SqlDialect::MySql);
        assert_eq!(Engine::MsSql.dialect(), SqlDialect::MsSql);
        assert_eq!(Engine::Postgres.dialect(), SqlDialect::Postgres);
    }
}
