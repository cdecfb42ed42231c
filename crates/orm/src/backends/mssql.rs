//! SQL Server Backend Implementation
//!
//! SQL Server implementation of the backend traits on top of tiberius.
//! tiberius has no pool of its own, so connections are kept in a small
//! semaphore-bounded idle list. Statements use `@paramN` placeholders and are
//! sent through `sp_executesql` with one declaration per parameter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, Query, Row};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::core::*;
use super::Engine;
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::sql::CompiledStatement;

type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server database backend implementation
#[derive(Debug, Default)]
pub struct MssqlBackend;

impl MssqlBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseBackend for MssqlBackend {
    async fn create_pool(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn DatabasePool>> {
        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(config.effective_port());
        tds.database(&config.database);
        if let Some(user) = &config.user {
            tds.authentication(AuthMethod::sql_server(user, config.password.as_deref().unwrap_or_default()));
        }
        tds.trust_cert();

        let pool = MssqlPool::new(
            tds,
            config.max_connections as usize,
            Duration::from_secs(config.acquire_timeout_seconds),
        );

        // Fail fast on unreachable servers instead of on first use
        let (permit, client) = pool
            .inner
            .checkout()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create SQL Server pool '{}': {}", config.name, e)))?;
        pool.inner.checkin(client);
        drop(permit);

        Ok(Arc::new(pool))
    }

    fn engine(&self) -> Engine {
        Engine::MsSql
    }
}

struct PoolInner {
    config: Config,
    max_connections: usize,
    acquire_timeout: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<MssqlClient>>,
}

impl PoolInner {
    /// Wait for a free slot, then reuse an idle connection or open a new one
    async fn checkout(&self) -> OrmResult<(OwnedSemaphorePermit, MssqlClient)> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| OrmError::Connection("Timed out waiting for a SQL Server connection".to_string()))?
            .map_err(|_| OrmError::Connection("SQL Server pool is closed".to_string()))?;

        let idle = self.idle.lock().pop();
        let client = match idle {
            Some(client) => client,
            None => self.connect().await?,
        };
        Ok((permit, client))
    }

    fn checkin(&self, client: MssqlClient) {
        if !self.permits.is_closed() {
            self.idle.lock().push(client);
        }
    }

    async fn connect(&self) -> OrmResult<MssqlClient> {
        let tcp = TcpStream::connect(self.config.get_addr())
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to reach SQL Server: {}", e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| OrmError::Connection(e.to_string()))?;

        tracing::debug!("Opening SQL Server connection to {}", self.config.get_addr());
        Ok(Client::connect(self.config.clone(), tcp.compat_write()).await?)
    }
}

/// SQL Server connection pool implementation
pub struct MssqlPool {
    inner: Arc<PoolInner>,
}

impl MssqlPool {
    fn new(config: Config, max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                max_connections,
                acquire_timeout,
                permits: Arc::new(Semaphore::new(max_connections)),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[async_trait]
impl DatabasePool for MssqlPool {
    async fn execute(&self, statement: &CompiledStatement) -> OrmResult<ExecResult> {
        let (permit, mut client) = self.inner.checkout().await?;
        let outcome = run_execute(&mut client, statement).await;
        if !matches!(outcome, Err(OrmError::Connection(_))) {
            self.inner.checkin(client);
        }
        drop(permit);
        outcome
    }

    async fn fetch_all(&self, statement: &CompiledStatement) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let (permit, mut client) = self.inner.checkout().await?;
        let outcome = run_fetch(&mut client, statement).await;
        if !matches!(outcome, Err(OrmError::Connection(_))) {
            self.inner.checkin(client);
        }
        drop(permit);
        Ok(outcome?
            .into_iter()
            .map(|row| Box::new(row) as Box<dyn DatabaseRow>)
            .collect())
    }

    fn fetch_stream<'a>(
        &'a self,
        statement: &'a CompiledStatement,
    ) -> BoxStream<'a, OrmResult<Box<dyn DatabaseRow>>> {
        // The driver stream borrows its client, so a task owns both and
        // hands rows over one at a time; a full channel pauses the cursor.
        let (tx, rx) = mpsc::channel::<OrmResult<ValueRow>>(1);
        let inner = self.inner.clone();
        let statement = statement.clone();

        tokio::spawn(async move {
            let (permit, mut client) = match inner.checkout().await {
                Ok(checked_out) => checked_out,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut completed = false;
            match build_query(&statement).query(&mut client).await {
                Ok(results) => {
                    let mut rows = results.into_row_stream();
                    loop {
                        match rows.try_next().await {
                            Ok(Some(row)) => {
                                let converted = convert_row(row);
                                let failed = converted.is_err();
                                if tx.send(converted).await.is_err() || failed {
                                    break;
                                }
                            }
                            Ok(None) => {
                                completed = true;
                                break;
                            }
                            Err(e) => {
                                let _ = tx.send(Err(e.into())).await;
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                }
            }

            // A half-read result set leaves the connection unusable
            if completed {
                inner.checkin(client);
            }
            drop(permit);
        });

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .map(|item| item.map(|row| Box::new(row) as Box<dyn DatabaseRow>))
            .boxed()
    }

    async fn close(&self) -> OrmResult<()> {
        self.inner.permits.close();
        let idle: Vec<MssqlClient> = std::mem::take(&mut *self.inner.idle.lock());
        for client in idle {
            if let Err(e) = client.close().await {
                tracing::warn!("Error closing SQL Server connection: {}", e);
            }
        }
        Ok(())
    }

    fn stats(&self) -> DatabasePoolStats {
        let idle = self.inner.idle.lock().len() as u32;
        let active = self
            .inner
            .max_connections
            .saturating_sub(self.inner.permits.available_permits()) as u32;
        DatabasePoolStats {
            total_connections: active + idle,
            idle_connections: idle,
            active_connections: active,
        }
    }
}

async fn run_execute(client: &mut MssqlClient, statement: &CompiledStatement) -> OrmResult<ExecResult> {
    let query = build_query(statement);

    if statement.returning.is_some() {
        let rows = query.query(client).await?.into_first_result().await?;
        let count = rows.len() as u64;
        let insert_id = match rows.into_iter().last() {
            Some(row) => Some(convert_row(row)?.get_by_index(0)?.to_json()),
            None => None,
        };
        return Ok(ExecResult {
            rows_affected: count,
            rows_changed: count,
            insert_id,
        });
    }

    let total = query.execute(client).await?.total();
    Ok(ExecResult {
        rows_affected: total,
        rows_changed: total,
        insert_id: None,
    })
}

async fn run_fetch(client: &mut MssqlClient, statement: &CompiledStatement) -> OrmResult<Vec<ValueRow>> {
    let rows = build_query(statement)
        .query(client)
        .await?
        .into_first_result()
        .await?;
    rows.into_iter().map(convert_row).collect()
}

fn build_query(statement: &CompiledStatement) -> Query<'static> {
    let mut query = Query::new(wrap_sql(statement));
    for value in &statement.params {
        bind_value(&mut query, value);
    }
    query
}

/// Wrap the statement in `sp_executesql` so `@paramN` names resolve
fn wrap_sql(statement: &CompiledStatement) -> String {
    if statement.params.is_empty() {
        return statement.sql.clone();
    }

    let declarations: Vec<String> = statement
        .names
        .iter()
        .zip(&statement.params)
        .map(|(name, value)| format!("@{} {}", name, declared_type(value)))
        .collect();
    let assignments: Vec<String> = statement
        .names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("@{} = @P{}", name, i + 1))
        .collect();

    format!(
        "EXEC sp_executesql N'{}', N'{}', {}",
        statement.sql.replace('\'', "''"),
        declarations.join(", "),
        assignments.join(", ")
    )
}

fn declared_type(value: &DatabaseValue) -> &'static str {
    match value {
        DatabaseValue::Null | DatabaseValue::String(_) | DatabaseValue::Json(_) => "nvarchar(max)",
        DatabaseValue::Bool(_) => "bit",
        DatabaseValue::Int32(_) => "int",
        DatabaseValue::Int64(_) => "bigint",
        DatabaseValue::Float32(_) => "real",
        DatabaseValue::Float64(_) => "float",
        DatabaseValue::Bytes(_) => "varbinary(max)",
        DatabaseValue::Uuid(_) => "uniqueidentifier",
        DatabaseValue::DateTime(_) => "datetimeoffset",
        DatabaseValue::NaiveDateTime(_) => "datetime2",
        DatabaseValue::Date(_) => "date",
        DatabaseValue::Time(_) => "time",
    }
}

fn bind_value(query: &mut Query<'static>, value: &DatabaseValue) {
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
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    }
}

fn convert_row(row: Row) -> OrmResult<ValueRow> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(names.len());
    for (name, data) in names.into_iter().zip(row) {
        values.push((name, convert_value(data)?));
    }
    Ok(ValueRow::new(values))
}

fn convert_value(data: ColumnData<'static>) -> OrmResult<DatabaseValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| DatabaseValue::Int32(i32::from(v))),
        ColumnData::I16(v) => v.map(|v| DatabaseValue::Int32(i32::from(v))),
        ColumnData::I32(v) => v.map(DatabaseValue::Int32),
        ColumnData::I64(v) => v.map(DatabaseValue::Int64),
        ColumnData::F32(v) => v.map(DatabaseValue::Float32),
        ColumnData::F64(v) => v.map(DatabaseValue::Float64),
        ColumnData::Bit(v) => v.map(DatabaseValue::Bool),
        ColumnData::String(v) => v.map(|s| DatabaseValue::String(s.into_owned())),
        ColumnData::Guid(v) => v.map(DatabaseValue::Uuid),
        ColumnData::Binary(v) => v.map(|b| DatabaseValue::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| {
            DatabaseValue::Float64(n.value() as f64 / 10f64.powi(i32::from(n.scale())))
        }),
        ColumnData::Xml(v) => v.map(|x| DatabaseValue::String(x.into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(&data)?.map(DatabaseValue::NaiveDateTime)
        }
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(&data)?.map(DatabaseValue::Date),
        ColumnData::Time(_) => chrono::NaiveTime::from_sql(&data)?.map(DatabaseValue::Time),
        ColumnData::DateTimeOffset(_) => {
            chrono::DateTime::<chrono::Utc>::from_sql(&data)?.map(DatabaseValue::DateTime)
        }
    };
    Ok(value.unwrap_or(DatabaseValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{ParameterContext, SqlDialect, StatementKind};

    #[test]
    fn test_declared_types_follow_bound_values() {
        assert_eq!(declared_type(&DatabaseValue::Int64(1)), "bigint");
        assert_eq!(declared_type(&DatabaseValue::String("a".into())), "nvarchar(max)");
        assert_eq!(declared_type(&DatabaseValue::Null), "nvarchar(max)");
    }

    #[test]
    fn test_parameterless_statement_is_sent_verbatim() {
        let statement = CompiledStatement::raw(SqlDialect::MsSql, "SELECT 1", Vec::new());
        assert_eq!(wrap_sql(&statement), "SELECT 1");
    }

    #[test]
    fn test_convert_value_maps_nulls() {
        assert_eq!(convert_value(ColumnData::I32(None)).unwrap(), DatabaseValue::Null);
        assert_eq!(convert_value(ColumnData::I32(Some(7))).unwrap(), DatabaseValue::Int32(7));
        assert_eq!(
            convert_value(ColumnData::String(Some("x".into()))).unwrap(),
            DatabaseValue::String("x".to_string())
        );
    }

    #[test]
    fn test_parameterized_statement_is_wrapped_in_sp_executesql() {
        let mut ctx = ParameterContext::new(SqlDialect::MsSql);
        let id = ctx.bind(1);
        let name = ctx.bind("o'neil");
        let statement = ctx.into_statement(
            format!("SELECT * FROM users WHERE id = {} AND name <> 'x' AND name = {}", id, name),
            StatementKind::Select,
        );
        assert_eq!(
            wrap_sql(&statement),
            "EXEC sp_executesql N'SELECT * FROM users WHERE id = @param1 AND name <> ''x'' AND name = @param2', \
             N'@param1 int, @param2 nvarchar(max)', @param1 = @P1, @param2 = @P2"
        );
    }
}
