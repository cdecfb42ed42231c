//! Query Builder - Core builder implementation

use super::condition::ConditionBuilder;
use super::types::*;
use super::weighted::WeightedCondition;
use crate::database::Database;
use crate::sql::SqlDialect;

/// Database handle and data-source key a builder executes against
#[derive(Debug, Clone)]
pub(crate) struct QueryTarget {
    pub(crate) db: Database,
    pub(crate) data_source: String,
}

/// Query builder for constructing database queries.
///
/// A builder describes one logical statement. It can be compiled and executed
/// any number of times; parameters are recomputed on every compilation.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    pub(crate) dialect: SqlDialect,
    pub(crate) target: Option<QueryTarget>,
    pub(crate) source: Option<TableSource>,
    pub(crate) columns: Vec<String>,
    pub(crate) additional_columns: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) conditions: ConditionBuilder,
    pub(crate) weighted: Vec<WeightedCondition>,
    pub(crate) group_by: Vec<String>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<u64>,
    pub(crate) offset_value: Option<u64>,
    pub(crate) payload: Option<WritePayload>,
    pub(crate) returning: Option<String>,
}

impl QueryBuilder {
    /// Create a detached builder that can compile but not execute
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            target: None,
            source: None,
            columns: Vec::new(),
            additional_columns: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            conditions: ConditionBuilder::new(),
            weighted: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit_count: None,
            offset_value: None,
            payload: None,
            returning: None,
        }
    }

    pub(crate) fn attached(dialect: SqlDialect, db: Database, data_source: &str) -> Self {
        let mut builder = Self::new(dialect);
        builder.target = Some(QueryTarget {
            db,
            data_source: data_source.to_string(),
        });
        builder
    }

    /// Fresh builder on the same data source and dialect
    pub fn fork(&self) -> Self {
        let mut builder = Self::new(self.dialect);
        builder.target = self.target.clone();
        builder
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn data_source(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.data_source.as_str())
    }

    /// Set the FROM target: a table name or [`TableSource::subquery`]
    pub fn table(mut self, source: impl Into<TableSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Select from a nested query under `alias`
    pub fn table_sub(self, query: QueryBuilder, alias: &str) -> Self {
        self.table(TableSource::subquery(query, alias))
    }

    pub fn table_name(&self) -> Option<&str> {
        self.source.as_ref().map(TableSource::reference_name)
    }

    /// Columns recorded with `add_col`, by the key they appear under in result rows
    pub fn additional_columns(&self) -> &[String] {
        &self.additional_columns
    }

    /// Columns currently projected
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}
