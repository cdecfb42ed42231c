//! Query Builder Types - Core types and enums for query building

use std::fmt;
use std::str::FromStr;

use super::builder::QueryBuilder;
use super::condition::ConditionBuilder;
use crate::backends::{DatabaseValue, Record};
use crate::error::ModelError;

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "<>"),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

impl FromStr for QueryOperator {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "=" => Ok(QueryOperator::Equal),
            "!=" | "<>" => Ok(QueryOperator::NotEqual),
            ">" => Ok(QueryOperator::GreaterThan),
            ">=" => Ok(QueryOperator::GreaterThanOrEqual),
            "<" => Ok(QueryOperator::LessThan),
            "<=" => Ok(QueryOperator::LessThanOrEqual),
            "LIKE" => Ok(QueryOperator::Like),
            "NOT LIKE" => Ok(QueryOperator::NotLike),
            other => Err(ModelError::Usage(format!("Unsupported operator '{}'", other))),
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// FROM target: a named table or a nested query with an alias
#[derive(Debug, Clone)]
pub enum TableSource {
    Named(String),
    Subquery { query: Box<QueryBuilder>, alias: String },
}

impl TableSource {
    pub fn subquery(query: QueryBuilder, alias: &str) -> Self {
        TableSource::Subquery {
            query: Box::new(query),
            alias: alias.to_string(),
        }
    }

    /// Name rows of this source are addressed by
    pub fn reference_name(&self) -> &str {
        match self {
            TableSource::Named(name) => name,
            TableSource::Subquery { alias, .. } => alias,
        }
    }
}

impl From<&str> for TableSource {
    fn from(name: &str) -> Self {
        TableSource::Named(name.to_string())
    }
}

impl From<String> for TableSource {
    fn from(name: String) -> Self {
        TableSource::Named(name)
    }
}

/// Join clause
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub target: TableSource,
    pub on: ConditionBuilder,
}

/// Rows of an INSERT: one record or many
#[derive(Debug, Clone)]
pub enum InsertRows {
    One(Record),
    Many(Vec<Record>),
}

impl InsertRows {
    pub fn into_vec(self) -> Vec<Record> {
        match self {
            InsertRows::One(row) => vec![row],
            InsertRows::Many(rows) => rows,
        }
    }
}

impl From<Record> for InsertRows {
    fn from(row: Record) -> Self {
        InsertRows::One(row)
    }
}

impl From<Vec<Record>> for InsertRows {
    fn from(rows: Vec<Record>) -> Self {
        InsertRows::Many(rows)
    }
}

/// Pending write attached to a builder
#[derive(Debug, Clone)]
pub enum WritePayload {
    Insert { rows: Vec<Vec<(String, DatabaseValue)>>, escape: bool },
    Update { values: Vec<(String, DatabaseValue)>, escape: bool },
}

/// Page metadata returned by `paginate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Pagination {
    pub total_rows: u64,
    pub per_page: u64,
    pub page: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(total_rows: u64, per_page: u64, page: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total_rows.div_ceil(per_page)
        };
        Self {
            total_rows,
            per_page,
            page,
            total_pages,
        }
    }
}
