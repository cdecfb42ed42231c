//! # trident-orm: dialect-agnostic query builder and active-record layer
//!
//! One builder API renders SQL for MySQL (`?` placeholders), SQL Server
//! (`@paramN`) and PostgreSQL (`$N`). On top of it sit active-record models
//! with dirty tracking, model collections, and relation resolvers whose eager
//! loading issues one batched statement per relation path level.
//!
//! - `sql`: dialects, identifier escaping and parameter numbering
//! - `query`: the query builder, conditions and weighted ordering
//! - `backends`: driver-backed pools behind the `DatabasePool` seam
//! - `database`: named data sources, lazily created pools, batches
//! - `model` / `relationships`: active records and their relations

pub mod backends;
pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod query;
pub mod relationships;
pub mod sql;
pub mod testing;

#[cfg(test)]
mod tests;

pub use backends::{DatabaseBackend, DatabasePool, DatabaseRow, DatabaseValue, Engine, ExecResult, Record};
pub use config::{ConfigError, ConnectionConfig};
pub use database::{BatchStatement, Database, PoolRegistry, StatementResult};
pub use error::{ModelError, ModelResult, OrmError, OrmResult};
pub use model::{EagerLoad, LoadedRelation, ModelCollection, ModelRecord, ModelSchema};
pub use query::{
    ConditionBuilder, JoinType, OrderDirection, Pagination, QueryBuilder, QueryOperator, WeightedCondition,
};
pub use relationships::{Relation, RelationKind};
pub use sql::{CompiledStatement, SqlDialect};
