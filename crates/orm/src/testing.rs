//! In-memory pool for exercising queries and models without a server
//!
//! [`RecordingPool`] records every statement it receives and answers from a
//! queue of canned responses, in order. An empty queue answers with no rows
//! (fetches) or one affected row (writes).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use crate::backends::{
    DatabasePool, DatabasePoolStats, DatabaseRow, DatabaseValue, Engine, ExecResult, Record, ValueRow,
};
use crate::config::ConnectionConfig;
use crate::database::Database;
use crate::error::{ModelError, OrmResult};
use crate::sql::CompiledStatement;

enum Response {
    Rows(Vec<ValueRow>),
    Exec(ExecResult),
    Error(ModelError),
}

#[derive(Default)]
pub struct RecordingPool {
    statements: Mutex<Vec<CompiledStatement>>,
    responses: Mutex<VecDeque<Response>>,
    rows_pulled: AtomicUsize,
    closed: AtomicBool,
}

impl RecordingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source named `name` on `db`, served by a new recording pool
    pub async fn attach(db: &Database, name: &str, engine: Engine) -> OrmResult<Arc<Self>> {
        let pool = Arc::new(Self::new());
        let config = ConnectionConfig::new(name, engine, "localhost", "recording");
        db.attach_pool(config, pool.clone()).await?;
        Ok(pool)
    }

    /// Queue a result set for the next fetch
    pub fn push_rows(&self, rows: Vec<Record>) {
        let rows = rows
            .into_iter()
            .map(|record| {
                ValueRow::new(
                    record
                        .into_iter()
                        .map(|(column, value)| (column, DatabaseValue::from_json(value)))
                        .collect(),
                )
            })
            .collect();
        self.responses.lock().push_back(Response::Rows(rows));
    }

    /// Queue the outcome of the next write
    pub fn push_exec(&self, result: ExecResult) {
        self.responses.lock().push_back(Response::Exec(result));
    }

    /// Make the next statement fail with `error`
    pub fn push_error(&self, error: ModelError) {
        self.responses.lock().push_back(Response::Error(error));
    }

    pub fn statements(&self) -> Vec<CompiledStatement> {
        self.statements.lock().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.lock().len()
    }

    pub fn last_statement(&self) -> Option<CompiledStatement> {
        self.statements.lock().last().cloned()
    }

    /// Rows handed out by streams so far
    pub fn rows_pulled(&self) -> usize {
        self.rows_pulled.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, statement: &CompiledStatement) -> Option<Response> {
        self.statements.lock().push(statement.clone());
        self.responses.lock().pop_front()
    }
}

#[async_trait]
impl DatabasePool for RecordingPool {
    async fn execute(&self, statement: &CompiledStatement) -> OrmResult<ExecResult> {
        match self.record(statement) {
            Some(Response::Exec(result)) => Ok(result),
            Some(Response::Error(error)) => Err(error),
            Some(Response::Rows(_)) | None => Ok(ExecResult {
                rows_affected: 1,
                rows_changed: 1,
                insert_id: None,
            }),
        }
    }

    async fn fetch_all(&self, statement: &CompiledStatement) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        match self.record(statement) {
            Some(Response::Rows(rows)) => Ok(rows
                .into_iter()
                .map(|row| Box::new(row) as Box<dyn DatabaseRow>)
                .collect()),
            Some(Response::Error(error)) => Err(error),
            Some(Response::Exec(_)) | None => Ok(Vec::new()),
        }
    }

    fn fetch_stream<'a>(
        &'a self,
        statement: &'a CompiledStatement,
    ) -> BoxStream<'a, OrmResult<Box<dyn DatabaseRow>>> {
        match self.record(statement) {
            Some(Response::Rows(rows)) => stream::iter(rows)
                .map(move |row| {
                    self.rows_pulled.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(row) as Box<dyn DatabaseRow>)
                })
                .boxed(),
            Some(Response::Error(error)) => stream::iter(vec![Err(error)]).boxed(),
            Some(Response::Exec(_)) | None => stream::empty().boxed(),
        }
    }

    async fn close(&self) -> OrmResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> DatabasePoolStats {
        DatabasePoolStats::default()
    }
}
