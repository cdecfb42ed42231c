//! Error types for the ORM system
//!
//! Every fallible operation in the crate returns [`ModelResult`]. Driver and
//! configuration errors are folded into [`ModelError`] so callers only ever
//! match on one taxonomy.

use std::fmt;

/// Result type alias for model and query operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Unknown data-source key or invalid connection configuration
    Configuration(String),
    /// Pool creation or connection acquisition failed
    Connection(String),
    /// The engine rejected a statement (syntax, constraint violation, ...)
    Statement { message: String, sql: String },
    /// Zero rows where exactly one was expected
    NotFound(String),
    /// The builder or model was used in a way its contract forbids
    Usage(String),
    /// Row or JSON conversion failed
    Serialization(String),
    /// Relation lookup or resolution failed
    Relationship(String),
}

impl ModelError {
    /// Build a statement error carrying the SQL that failed
    pub fn statement(message: impl Into<String>, sql: impl Into<String>) -> Self {
        ModelError::Statement {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Whether this error represents an expected absence rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ModelError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ModelError::Statement { message, sql } => {
                write!(f, "Statement error: {} (sql: {})", message, sql)
            }
            ModelError::NotFound(what) => write!(f, "Record not found: {}", what),
            ModelError::Usage(msg) => write!(f, "Usage error: {}", msg),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::Relationship(msg) => write!(f, "Relationship error: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                ModelError::Connection(err.to_string())
            }
            sqlx::Error::Configuration(e) => ModelError::Configuration(e.to_string()),
            other => ModelError::statement(other.to_string(), String::new()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(feature = "mssql")]
impl From<tiberius::error::Error> for ModelError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Io { .. } | tiberius::error::Error::Tls(_) | tiberius::error::Error::Routing { .. } => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::statement(other.to_string(), String::new()),
        }
    }
}

/// Attach the failing SQL to a statement error that was raised without it
pub(crate) fn with_sql(err: ModelError, sql: &str) -> ModelError {
    match err {
        ModelError::Statement { message, sql: existing } if existing.is_empty() => {
            ModelError::statement(message, sql)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(
            ModelError::NotFound("users(999999)".to_string()).to_string(),
            "Record not found: users(999999)"
        );
        assert_eq!(
            ModelError::statement("syntax error", "SELEC 1").to_string(),
            "Statement error: syntax error (sql: SELEC 1)"
        );
    }

    #[test]
    fn test_with_sql_only_fills_missing_sql() {
        let err = with_sql(ModelError::statement("boom", ""), "DELETE FROM t");
        assert_eq!(err, ModelError::statement("boom", "DELETE FROM t"));

        let kept = with_sql(ModelError::statement("boom", "A"), "B");
        assert_eq!(kept, ModelError::statement("boom", "A"));

        let other = with_sql(ModelError::Usage("x".into()), "B");
        assert_eq!(other, ModelError::Usage("x".into()));
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(ModelError::NotFound("x".into()).is_not_found());
        assert!(!ModelError::Usage("x".into()).is_not_found());
    }
}
