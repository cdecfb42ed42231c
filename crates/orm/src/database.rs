//! Database entry point and connection pool registry
//!
//! [`Database`] is an explicitly owned, cloneable handle bundling the known
//! connection configurations, the engine backends and a [`PoolRegistry`].
//! Pools are created lazily on first use, one per configuration name, and
//! live until `close_pool`/`close_pools` evicts them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::backends::{DatabaseBackendRegistry, DatabasePool, DatabasePoolStats, ExecResult, Record};
use crate::config::ConnectionConfig;
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;

/// Database connection pool error types
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Unknown data source '{name}'")]
    UnknownDataSource { name: String },

    #[error("Failed to open pool for '{name}': {reason}")]
    CreationFailed { name: String, reason: String },

    #[error("Pool for '{name}' is closed")]
    PoolClosed { name: String },
}

impl From<PoolError> for ModelError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::UnknownDataSource { .. } => ModelError::Configuration(err.to_string()),
            PoolError::CreationFailed { .. } | PoolError::PoolClosed { .. } => {
                ModelError::Connection(err.to_string())
            }
        }
    }
}

/// Owned registry of open pools keyed by configuration name
#[derive(Clone)]
pub struct PoolRegistry {
    backends: DatabaseBackendRegistry,
    pools: Arc<Mutex<HashMap<String, Arc<dyn DatabasePool>>>>,
}

impl PoolRegistry {
    pub fn new(backends: DatabaseBackendRegistry) -> Self {
        Self {
            backends,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Pool for `config`, opening it on first use
    pub async fn get_or_create(&self, config: &ConnectionConfig) -> ModelResult<Arc<dyn DatabasePool>> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&config.name) {
            return Ok(Arc::clone(pool));
        }

        let pool = self.backends.create_pool(config).await.map_err(|e| match e {
            ModelError::Configuration(_) => e,
            other => ModelError::from(PoolError::CreationFailed {
                name: config.name.clone(),
                reason: other.to_string(),
            }),
        })?;
        tracing::info!(
            "Opened {} pool '{}' ({}:{}, max {} connections)",
            config.engine,
            config.name,
            config.host,
            config.effective_port(),
            config.max_connections
        );
        pools.insert(config.name.clone(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Install an externally created pool under `name`, replacing any existing one
    pub async fn insert(&self, name: &str, pool: Arc<dyn DatabasePool>) {
        self.pools.lock().await.insert(name.to_string(), pool);
    }

    /// Close and evict one pool; returns whether it was open
    pub async fn close(&self, name: &str) -> ModelResult<bool> {
        let pool = self.pools.lock().await.remove(name);
        match pool {
            Some(pool) => {
                pool.close().await?;
                tracing::info!("Closed pool '{}'", name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close and evict every pool
    pub async fn close_all(&self) -> ModelResult<()> {
        let drained: Vec<(String, Arc<dyn DatabasePool>)> = self.pools.lock().await.drain().collect();
        for (name, pool) in drained {
            pool.close().await?;
            tracing::info!("Closed pool '{}'", name);
        }
        Ok(())
    }

    pub async fn is_open(&self, name: &str) -> bool {
        self.pools.lock().await.contains_key(name)
    }

    pub async fn stats(&self, name: &str) -> Option<DatabasePoolStats> {
        self.pools.lock().await.get(name).map(|pool| pool.stats())
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry").field("backends", &self.backends).finish()
    }
}

struct DatabaseInner {
    configs: RwLock<HashMap<String, ConnectionConfig>>,
    pools: PoolRegistry,
}

/// Entry point: named data sources, their pools and query builders
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Database using every backend compiled into this build
    pub fn new(configs: Vec<ConnectionConfig>) -> ModelResult<Self> {
        Self::with_registry(configs, PoolRegistry::new(DatabaseBackendRegistry::with_defaults()))
    }

    pub fn with_registry(configs: Vec<ConnectionConfig>, pools: PoolRegistry) -> ModelResult<Self> {
        let db = Self {
            inner: Arc::new(DatabaseInner {
                configs: RwLock::new(HashMap::new()),
                pools,
            }),
        };
        for config in configs {
            db.add_config(config)?;
        }
        Ok(db)
    }

    /// Register (or replace) a named configuration
    pub fn add_config(&self, config: ConnectionConfig) -> ModelResult<()> {
        config.validate()?;
        self.inner.configs.write().insert(config.name.clone(), config);
        Ok(())
    }

    pub fn config(&self, data_source: &str) -> ModelResult<ConnectionConfig> {
        self.inner
            .configs
            .read()
            .get(data_source)
            .cloned()
            .ok_or_else(|| {
                PoolError::UnknownDataSource {
                    name: data_source.to_string(),
                }
                .into()
            })
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.inner.pools
    }

    /// New query builder bound to `data_source`
    pub fn query(&self, data_source: &str) -> ModelResult<QueryBuilder> {
        let config = self.config(data_source)?;
        Ok(QueryBuilder::attached(config.engine.dialect(), self.clone(), data_source))
    }

    /// Open pool for `data_source`, creating it on first use
    pub async fn pool(&self, data_source: &str) -> ModelResult<Arc<dyn DatabasePool>> {
        let config = self.config(data_source)?;
        self.inner.pools.get_or_create(&config).await
    }

    /// Register `config` and serve it from an already open pool
    pub async fn attach_pool(&self, config: ConnectionConfig, pool: Arc<dyn DatabasePool>) -> ModelResult<()> {
        let name = config.name.clone();
        self.add_config(config)?;
        self.inner.pools.insert(&name, pool).await;
        Ok(())
    }

    pub async fn close_pool(&self, data_source: &str) -> ModelResult<bool> {
        self.inner.pools.close(data_source).await
    }

    pub async fn close_pools(&self) -> ModelResult<()> {
        self.inner.pools.close_all().await
    }

    /// Run statements concurrently and report every outcome in input order.
    ///
    /// Always resolves: a failing member yields a result with `success == false`
    /// and its error, without affecting the others.
    pub async fn run_all(&self, statements: Vec<BatchStatement>) -> Vec<StatementResult> {
        join_all(statements.iter().map(BatchStatement::run))
            .await
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(StatementResult::failed))
            .collect()
    }

    /// Run statements concurrently, failing with the first error
    pub async fn try_run_all(&self, statements: Vec<BatchStatement>) -> ModelResult<Vec<StatementResult>> {
        try_join_all(statements.iter().map(BatchStatement::run)).await
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.inner.configs.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("Database").field("data_sources", &names).finish()
    }
}

/// One member of a multi-statement batch
#[derive(Debug, Clone)]
pub enum BatchStatement {
    Fetch(QueryBuilder),
    Save(QueryBuilder),
    Delete(QueryBuilder),
}

impl BatchStatement {
    async fn run(&self) -> ModelResult<StatementResult> {
        match self {
            BatchStatement::Fetch(query) => Ok(StatementResult::from_rows(query.fetch().await?)),
            BatchStatement::Save(query) => Ok(StatementResult::from_exec(query.save().await?)),
            BatchStatement::Delete(query) => Ok(StatementResult::from_exec(query.delete().await?)),
        }
    }
}

/// Normalized outcome of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub success: bool,
    pub rows: Option<Vec<Record>>,
    pub rows_affected: Option<u64>,
    pub rows_changed: Option<u64>,
    pub insert_id: Option<serde_json::Value>,
    pub error: Option<ModelError>,
}

impl StatementResult {
    pub fn from_rows(rows: Vec<Record>) -> Self {
        Self {
            success: true,
            rows: Some(rows),
            ..Default::default()
        }
    }

    pub fn from_exec(result: ExecResult) -> Self {
        Self {
            success: true,
            rows_affected: Some(result.rows_affected),
            rows_changed: Some(result.rows_changed),
            insert_id: result.insert_id,
            ..Default::default()
        }
    }

    pub fn failed(error: ModelError) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }
}
