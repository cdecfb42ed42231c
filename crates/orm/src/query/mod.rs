//! Query Builder Module - fluent, dialect-agnostic statement builder
//!
//! One [`QueryBuilder`] surface compiles to MySQL, SQL Server or PostgreSQL
//! text with the matching placeholder style.

pub mod builder;
pub mod condition;
pub mod dml;
pub mod execution;
pub mod introspection;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod weighted;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use condition::{Bracket, ConditionBuilder, ConditionNode, InSet, LogicOperator};
pub use types::{InsertRows, JoinClause, JoinType, OrderDirection, Pagination, QueryOperator, TableSource};
pub use weighted::{Otherwise, WeightedCondition, WEIGHT_COLUMN};
