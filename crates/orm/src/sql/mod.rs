//! SQL Dialects and Parameterization
//!
//! This module owns everything that differs textually between engines:
//! placeholder syntax, identifier quoting, literal rendering, conditional
//! expressions and paging clauses. The query builder only ever asks a
//! [`SqlDialect`] for tokens and threads one [`ParameterContext`] through a
//! whole statement, nested subqueries included.

pub mod dialect;
pub mod params;

pub use dialect::SqlDialect;
pub use params::{CompiledStatement, ParameterContext, StatementKind};
