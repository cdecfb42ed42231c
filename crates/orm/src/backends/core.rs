//! Engine seam: pools, rows and bound values
//!
//! This module defines the traits and value types every engine backend
//! implements. They abstract away driver-specific types so the query builder
//! and the model layer work the same against MySQL, SQL Server and PostgreSQL.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value as JsonValue;

use super::Engine;
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::sql::CompiledStatement;

/// One result row as an ordered column → JSON value map
pub type Record = serde_json::Map<String, JsonValue>;

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a statement that does not produce a result set
    async fn execute(&self, statement: &CompiledStatement) -> OrmResult<ExecResult>;

    /// Execute a statement and return every result row
    async fn fetch_all(&self, statement: &CompiledStatement) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a statement and return its rows as a pull-based stream.
    ///
    /// The underlying cursor only advances while the stream is polled, so a
    /// consumer that stops polling pauses the producer.
    fn fetch_stream<'a>(
        &'a self,
        statement: &'a CompiledStatement,
    ) -> BoxStream<'a, OrmResult<Box<dyn DatabaseRow>>>;

    /// Close the pool and release every connection
    async fn close(&self) -> OrmResult<()>;

    /// Get pool statistics
    fn stats(&self) -> DatabasePoolStats;
}

/// Database pool statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabasePoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub active_connections: u32,
}

/// Outcome of a non-query statement, normalized across engines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Rows whose values actually changed; engines that cannot tell report `rows_affected`
    pub rows_changed: u64,
    pub insert_id: Option<JsonValue>,
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue>;

    /// Get column count
    fn column_count(&self) -> usize;

    /// Get column names in result-set order
    fn column_names(&self) -> Vec<String>;

    /// Convert the row to an ordered JSON record
    fn to_record(&self) -> OrmResult<Record> {
        let mut record = Record::new();
        for (index, name) in self.column_names().into_iter().enumerate() {
            record.insert(name, self.get_by_index(index)?.to_json());
        }
        Ok(record)
    }
}

/// Fully materialized row, used by backends whose driver rows borrow a connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRow {
    columns: Vec<(String, DatabaseValue)>,
}

impl ValueRow {
    pub fn new(columns: Vec<(String, DatabaseValue)>) -> Self {
        Self { columns }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) {
        self.columns.push((name.into(), value.into()));
    }
}

impl DatabaseRow for ValueRow {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        self.columns
            .get(index)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| OrmError::Serialization(format!("Column index {} out of range", index)))
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| OrmError::Serialization(format!("Column '{}' not found", name)))
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    NaiveDateTime(chrono::NaiveDateTime),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float32(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::NaiveDateTime(dt) => JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }

    /// Create a DatabaseValue from a JSON value.
    ///
    /// Strings stay strings; arrays and objects are bound as JSON documents.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DatabaseValue::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            other => DatabaseValue::Json(other),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<u32> for DatabaseValue {
    fn from(value: u32) -> Self {
        DatabaseValue::Int64(i64::from(value))
    }
}

impl From<f32> for DatabaseValue {
    fn from(value: f32) -> Self {
        DatabaseValue::Float32(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<&String> for DatabaseValue {
    fn from(value: &String) -> Self {
        DatabaseValue::String(value.clone())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDateTime> for DatabaseValue {
    fn from(value: chrono::NaiveDateTime) -> Self {
        DatabaseValue::NaiveDateTime(value)
    }
}

impl From<chrono::NaiveDate> for DatabaseValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<chrono::NaiveTime> for DatabaseValue {
    fn from(value: chrono::NaiveTime) -> Self {
        DatabaseValue::Time(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::from_json(value)
    }
}

impl From<&JsonValue> for DatabaseValue {
    fn from(value: &JsonValue) -> Self {
        DatabaseValue::from_json(value.clone())
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Database backend trait: one implementation per engine
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Open a connection pool for the given configuration
    async fn create_pool(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn DatabasePool>>;

    /// Engine served by this backend
    fn engine(&self) -> Engine;
}

/// Database backend registry mapping engines to their backend implementation
#[derive(Clone)]
pub struct DatabaseBackendRegistry {
    backends: HashMap<Engine, Arc<dyn DatabaseBackend>>,
}

impl DatabaseBackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry pre-populated with every backend compiled into this build
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "mysql")]
        registry.register(Arc::new(super::MySqlBackend::new()));
        #[cfg(feature = "mssql")]
        registry.register(Arc::new(super::MssqlBackend::new()));
        #[cfg(feature = "postgres")]
        registry.register(Arc::new(super::PostgresBackend::new()));
        registry
    }

    /// Register (or replace) the backend for its engine
    pub fn register(&mut self, backend: Arc<dyn DatabaseBackend>) {
        self.backends.insert(backend.engine(), backend);
    }

    /// Get a database backend by engine
    pub fn get(&self, engine: Engine) -> Option<Arc<dyn DatabaseBackend>> {
        self.backends.get(&engine).cloned()
    }

    /// Create a connection pool through the backend registered for the config's engine
    pub async fn create_pool(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn DatabasePool>> {
        let backend = self.get(config.engine).ok_or_else(|| {
            OrmError::Configuration(format!(
                "No backend registered for engine '{}' (data source '{}')",
                config.engine, config.name
            ))
        })?;
        backend.create_pool(config).await
    }

    /// List all registered engines
    pub fn registered_engines(&self) -> Vec<Engine> {
        self.backends.keys().copied().collect()
    }
}

impl Default for DatabaseBackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for DatabaseBackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBackendRegistry")
            .field("engines", &self.registered_engines())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_row_to_record_preserves_column_order() {
        let mut row = ValueRow::default();
        row.push("zeta", 1i64);
        row.push("alpha", "a");
        row.push("mid", DatabaseValue::Null);

        let record = row.to_record().unwrap();
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(record["alpha"], json!("a"));
        assert_eq!(record["mid"], JsonValue::Null);
    }

    #[test]
    fn test_from_json_does_not_reinterpret_strings() {
        let uuid_like = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(
            DatabaseValue::from_json(json!(uuid_like)),
            DatabaseValue::String(uuid_like.to_string())
        );
        assert_eq!(DatabaseValue::from_json(json!(7)), DatabaseValue::Int64(7));
        assert_eq!(DatabaseValue::from_json(json!({"a": 1})), DatabaseValue::Json(json!({"a": 1})));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let row = ValueRow::new(vec![("id".to_string(), DatabaseValue::Int32(1))]);
        assert!(row.get_by_name("email").is_err());
        assert_eq!(row.get_by_name("id").unwrap(), DatabaseValue::Int32(1));
    }

    #[test]
    fn test_empty_registry_reports_configuration_error() {
        let registry = DatabaseBackendRegistry::new();
        let config = ConnectionConfig::new("main", Engine::MySql, "localhost", "app");
        let err = futures::executor::block_on(registry.create_pool(&config)).err().unwrap();
        assert!(matches!(err, OrmError::Configuration(_)));
    }
}
