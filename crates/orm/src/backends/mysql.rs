//! MySQL Backend Implementation
//!
//! MySQL/MariaDB implementation of the backend traits on top of sqlx.
//! Inserted ids are read from the driver's `last_insert_id`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySql, Pool, Row, TypeInfo, ValueRef};

use super::core::*;
use super::Engine;
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::sql::CompiledStatement;

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// MySQL database backend implementation
#[derive(Debug, Default)]
pub struct MySqlBackend;

impl MySqlBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseBackend for MySqlBackend {
    async fn create_pool(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn DatabasePool>> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create MySQL pool '{}': {}", config.name, e)))?;

        Ok(Arc::new(MySqlPool::new(pool)))
    }

    fn engine(&self) -> Engine {
        Engine::MySql
    }
}

/// MySQL connection pool implementation
pub struct MySqlPool {
    pool: Pool<MySql>,
}

impl MySqlPool {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabasePool for MySqlPool {
    async fn execute(&self, statement: &CompiledStatement) -> OrmResult<ExecResult> {
        let result = bind_all(sqlx::query(&statement.sql), &statement.params)
            .execute(&self.pool)
            .await?;

        let insert_id = match (statement.returning.is_some(), result.last_insert_id()) {
            (true, id) if id > 0 => Some(JsonValue::from(id)),
            _ => None,
        };
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            rows_changed: result.rows_affected(),
            insert_id,
        })
    }

    async fn fetch_all(&self, statement: &CompiledStatement) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Box::new(MySqlDbRow::new(row)) as Box<dyn DatabaseRow>)
            .collect())
    }

    fn fetch_stream<'a>(
        &'a self,
        statement: &'a CompiledStatement,
    ) -> BoxStream<'a, OrmResult<Box<dyn DatabaseRow>>> {
        bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch(&self.pool)
            .map(|row| {
                row.map(|r| Box::new(MySqlDbRow::new(r)) as Box<dyn DatabaseRow>)
                    .map_err(OrmError::from)
            })
            .boxed()
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn stats(&self) -> DatabasePoolStats {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        DatabasePoolStats {
            total_connections: total,
            idle_connections: idle,
            active_connections: total.saturating_sub(idle),
        }
    }
}

/// MySQL row implementation
pub struct MySqlDbRow {
    row: MySqlRow,
}

impl MySqlDbRow {
    pub fn new(row: MySqlRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for MySqlDbRow {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        if index >= self.row.len() {
            return Err(OrmError::Serialization(format!("Column index {} out of range", index)));
        }
        decode_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| OrmError::Serialization(format!("Column '{}' not found", name)))?;
        decode_value(&self.row, index)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.row.columns().iter().map(|col| col.name().to_string()).collect()
    }
}

fn bind_all<'q>(mut query: MySqlQuery<'q>, params: &[DatabaseValue]) -> MySqlQuery<'q> {
    for param in params {
        query = bind_value(query, param);
    }
    query
}

fn bind_value<'q>(query: MySqlQuery<'q>, value: &DatabaseValue) -> MySqlQuery<'q> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float32(f) => query.bind(*f),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::NaiveDateTime(dt) => query.bind(*dt),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Time(t) => query.bind(*t),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn decode_value(row: &MySqlRow, index: usize) -> OrmResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOLEAN" => DatabaseValue::Bool(row.try_get(index)?),
        "TINYINT" => DatabaseValue::Int32(i32::from(row.try_get::<i8, _>(index)?)),
        "SMALLINT" => DatabaseValue::Int32(i32::from(row.try_get::<i16, _>(index)?)),
        "INT" | "MEDIUMINT" => DatabaseValue::Int32(row.try_get(index)?),
        "BIGINT" => DatabaseValue::Int64(row.try_get(index)?),
        "TINYINT UNSIGNED" => DatabaseValue::Int32(i32::from(row.try_get::<u8, _>(index)?)),
        "SMALLINT UNSIGNED" => DatabaseValue::Int32(i32::from(row.try_get::<u16, _>(index)?)),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => DatabaseValue::Int64(i64::from(row.try_get::<u32, _>(index)?)),
        "BIGINT UNSIGNED" => {
            let value: u64 = row.try_get(index)?;
            match i64::try_from(value) {
                Ok(v) => DatabaseValue::Int64(v),
                Err(_) => DatabaseValue::String(value.to_string()),
            }
        }
        "FLOAT" => DatabaseValue::Float32(row.try_get(index)?),
        "DOUBLE" => DatabaseValue::Float64(row.try_get(index)?),
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            DatabaseValue::String(row.try_get(index)?)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            DatabaseValue::Bytes(row.try_get(index)?)
        }
        "DATETIME" => DatabaseValue::NaiveDateTime(row.try_get(index)?),
        "TIMESTAMP" => DatabaseValue::DateTime(row.try_get(index)?),
        "DATE" => DatabaseValue::Date(row.try_get(index)?),
        "TIME" => DatabaseValue::Time(row.try_get(index)?),
        "JSON" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?),
        other => match row.try_get::<String, _>(index) {
            Ok(text) => DatabaseValue::String(text),
            Err(e) => {
                return Err(OrmError::Serialization(format!(
                    "Unsupported MySQL column type '{}' in column {}: {}",
                    other, index, e
                )))
            }
        },
    };
    Ok(value)
}
