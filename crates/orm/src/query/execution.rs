//! Query Builder execution
//!
//! Builders returned by [`Database::query`](crate::database::Database::query)
//! carry the data source they run against; detached builders only compile.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value as JsonValue;

use super::builder::QueryBuilder;
use crate::backends::{DatabasePool, DatabaseValue, ExecResult, Record};
use crate::database::Database;
use crate::error::{with_sql, ModelError, ModelResult};
use crate::model::{ModelCollection, ModelRecord, ModelSchema};
use crate::sql::CompiledStatement;

impl QueryBuilder {
    fn database(&self) -> ModelResult<(&Database, &str)> {
        self.target
            .as_ref()
            .map(|t| (&t.db, t.data_source.as_str()))
            .ok_or_else(|| ModelError::Usage("query is not bound to a data source".to_string()))
    }

    async fn pool(&self) -> ModelResult<Arc<dyn DatabasePool>> {
        let (db, data_source) = self.database()?;
        db.pool(data_source).await
    }

    /// Run a compiled statement that returns rows
    pub(crate) async fn fetch_statement(&self, statement: &CompiledStatement) -> ModelResult<Vec<Record>> {
        let pool = self.pool().await?;
        tracing::debug!(
            "Fetching on '{}': {} ({} params)",
            self.data_source().unwrap_or_default(),
            statement.sql,
            statement.param_count()
        );
        let rows = pool.fetch_all(statement).await.map_err(|e| {
            tracing::error!("Statement failed: {}", e);
            with_sql(e, &statement.sql)
        })?;
        rows.iter().map(|row| row.to_record()).collect()
    }

    /// Run a compiled statement that does not return rows
    pub(crate) async fn execute_statement(&self, statement: &CompiledStatement) -> ModelResult<ExecResult> {
        let pool = self.pool().await?;
        tracing::debug!(
            "Executing on '{}': {} ({} params)",
            self.data_source().unwrap_or_default(),
            statement.sql,
            statement.param_count()
        );
        pool.execute(statement).await.map_err(|e| {
            tracing::error!("Statement failed: {}", e);
            with_sql(e, &statement.sql)
        })
    }

    /// Execute the SELECT and return every row
    pub async fn fetch(&self) -> ModelResult<Vec<Record>> {
        let statement = self.generate_select()?;
        self.fetch_statement(&statement).await
    }

    /// Execute the SELECT and return the first row, if any
    pub async fn fetch_first(&self) -> ModelResult<Option<Record>> {
        Ok(self.fetch().await?.into_iter().next())
    }

    /// Execute the SELECT and hydrate each row as a model of `schema`
    pub async fn fetch_models(&self, schema: &'static ModelSchema) -> ModelResult<ModelCollection> {
        let (db, _) = self.database()?;
        let rows = self.fetch().await?;
        Ok(self.hydrate(db, schema, rows))
    }

    pub(crate) fn hydrate(&self, db: &Database, schema: &'static ModelSchema, rows: Vec<Record>) -> ModelCollection {
        rows.into_iter()
            .map(|row| ModelRecord::from_row(db.clone(), schema, row, &self.additional_columns))
            .collect()
    }

    /// Stream rows to `callback` in batches of `batch_size`.
    ///
    /// The cursor is not advanced while a callback is pending. A callback
    /// returning `Ok(false)` stops the stream; any trailing partial batch is
    /// delivered once the cursor is exhausted. Returns the number of rows
    /// handed to the callback.
    pub async fn stream<F, Fut>(&self, batch_size: usize, mut callback: F) -> ModelResult<u64>
    where
        F: FnMut(Vec<Record>) -> Fut,
        Fut: Future<Output = ModelResult<bool>>,
    {
        let batch_size = batch_size.max(1);
        let statement = self.generate_select()?;
        let pool = self.pool().await?;
        tracing::debug!(
            "Streaming on '{}': {} (batch size {})",
            self.data_source().unwrap_or_default(),
            statement.sql,
            batch_size
        );

        let mut rows = pool.fetch_stream(&statement);
        let mut batch = Vec::with_capacity(batch_size);
        let mut delivered = 0u64;

        while let Some(row) = rows.next().await {
            let row = row.map_err(|e| with_sql(e, &statement.sql))?;
            batch.push(row.to_record()?);
            if batch.len() >= batch_size {
                delivered += batch.len() as u64;
                if !callback(std::mem::take(&mut batch)).await? {
                    tracing::debug!("Stream stopped by consumer after {} rows", delivered);
                    return Ok(delivered);
                }
            }
        }

        if !batch.is_empty() {
            delivered += batch.len() as u64;
            callback(batch).await?;
        }
        Ok(delivered)
    }

    /// [`stream`](Self::stream), hydrating each batch as models of `schema`
    pub async fn stream_models<F, Fut>(
        &self,
        schema: &'static ModelSchema,
        batch_size: usize,
        mut callback: F,
    ) -> ModelResult<u64>
    where
        F: FnMut(ModelCollection) -> Fut,
        Fut: Future<Output = ModelResult<bool>>,
    {
        let (db, _) = self.database()?;
        let db = db.clone();
        self.stream(batch_size, |rows| callback(self.hydrate(&db, schema, rows)))
            .await
    }

    /// Execute the staged INSERT or UPDATE
    pub async fn save(&self) -> ModelResult<ExecResult> {
        let statement = self.generate_save()?;
        self.execute_statement(&statement).await
    }

    /// Execute a DELETE scoped by the accumulated predicate
    pub async fn delete(&self) -> ModelResult<ExecResult> {
        let statement = self.generate_delete()?;
        self.execute_statement(&statement).await
    }

    /// Count the rows the SELECT would return
    pub async fn count(&self) -> ModelResult<u64> {
        let statement = self.generate_count()?;
        let rows = self.fetch_statement(&statement).await?;
        Ok(rows.first().map(read_count).unwrap_or(0))
    }

    /// Run caller-written SQL returning rows; placeholders must match the dialect
    pub async fn raw_query(&self, sql: &str, params: Vec<DatabaseValue>) -> ModelResult<Vec<Record>> {
        let statement = CompiledStatement::raw(self.dialect, sql, params);
        self.fetch_statement(&statement).await
    }

    /// Run caller-written SQL that does not return rows
    pub async fn raw_execute(&self, sql: &str, params: Vec<DatabaseValue>) -> ModelResult<ExecResult> {
        let statement = CompiledStatement::raw(self.dialect, sql, params);
        self.execute_statement(&statement).await
    }
}

/// First column of a COUNT row as an unsigned integer
pub(crate) fn read_count(row: &Record) -> u64 {
    match row.get("total").or_else(|| row.values().next()) {
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(JsonValue::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlDialect;
    use serde_json::json;

    #[test]
    fn test_read_count_accepts_numeric_shapes() {
        let mut row = Record::new();
        row.insert("total".into(), json!(42));
        assert_eq!(read_count(&row), 42);
        row.insert("total".into(), json!("17"));
        assert_eq!(read_count(&row), 17);
    }

    #[tokio::test]
    async fn test_detached_builder_cannot_execute() {
        let q = QueryBuilder::new(SqlDialect::MySql).table("users");
        let err = q.fetch().await.unwrap_err();
        assert!(matches!(err, ModelError::Usage(_)));
    }
}
