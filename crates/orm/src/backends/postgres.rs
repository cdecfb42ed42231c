//! PostgreSQL Backend Implementation
//!
//! PostgreSQL-specific implementation of the backend traits using sqlx as the
//! underlying driver. Inserted ids come back through `RETURNING`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, Pool, Postgres, Row, TypeInfo, ValueRef};

use super::core::*;
use super::Engine;
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::sql::CompiledStatement;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// PostgreSQL database backend implementation
#[derive(Debug, Default)]
pub struct PostgresBackend;

impl PostgresBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
    async fn create_pool(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn DatabasePool>> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create PostgreSQL pool '{}': {}", config.name, e)))?;

        Ok(Arc::new(PostgresPool::new(pool)))
    }

    fn engine(&self) -> Engine {
        Engine::Postgres
    }
}

/// PostgreSQL connection pool implementation
pub struct PostgresPool {
    pool: Pool<Postgres>,
}

impl PostgresPool {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabasePool for PostgresPool {
    async fn execute(&self, statement: &CompiledStatement) -> OrmResult<ExecResult> {
        let query = bind_all(sqlx::query(&statement.sql), &statement.params);

        if statement.returning.is_some() {
            let rows = query.fetch_all(&self.pool).await?;
            let insert_id = match rows.last() {
                Some(row) => Some(decode_value(row, 0)?.to_json()),
                None => None,
            };
            let count = rows.len() as u64;
            return Ok(ExecResult {
                rows_affected: count,
                rows_changed: count,
                insert_id,
            });
        }

        let result = query.execute(&self.pool).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            rows_changed: result.rows_affected(),
            insert_id: None,
        })
    }

    async fn fetch_all(&self, statement: &CompiledStatement) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Box::new(PostgresRow::new(row)) as Box<dyn DatabaseRow>)
            .collect())
    }

    fn fetch_stream<'a>(
        &'a self,
        statement: &'a CompiledStatement,
    ) -> BoxStream<'a, OrmResult<Box<dyn DatabaseRow>>> {
        bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch(&self.pool)
            .map(|row| {
                row.map(|r| Box::new(PostgresRow::new(r)) as Box<dyn DatabaseRow>)
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

/// PostgreSQL row implementation
pub struct PostgresRow {
    row: PgRow,
}

impl PostgresRow {
    pub fn new(row: PgRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for PostgresRow {
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

fn bind_all<'q>(mut query: PgQuery<'q>, params: &[DatabaseValue]) -> PgQuery<'q> {
    for param in params {
        query = bind_value(query, param);
    }
    query
}

/// Bind a DatabaseValue to a sqlx query
fn bind_value<'q>(query: PgQuery<'q>, value: &DatabaseValue) -> PgQuery<'q> {
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

/// Convert a PostgreSQL column value to DatabaseValue
fn decode_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int32(i32::from(row.try_get::<i16, _>(index)?)),
        "INT4" => DatabaseValue::Int32(row.try_get(index)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index)?),
        "FLOAT4" => DatabaseValue::Float32(row.try_get(index)?),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => DatabaseValue::String(row.try_get(index)?),
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index)?),
        "TIMESTAMP" => DatabaseValue::NaiveDateTime(row.try_get(index)?),
        "DATE" => DatabaseValue::Date(row.try_get(index)?),
        "TIME" => DatabaseValue::Time(row.try_get(index)?),
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?),
        other => match row.try_get::<String, _>(index) {
            Ok(text) => DatabaseValue::String(text),
            Err(e) => {
                return Err(OrmError::Serialization(format!(
                    "Unsupported PostgreSQL column type '{}' in column {}: {}",
                    other, index, e
                )))
            }
        },
    };
    Ok(value)
}
