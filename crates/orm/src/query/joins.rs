//! Query Builder JOIN operations

use super::builder::QueryBuilder;
use super::condition::ConditionBuilder;
use super::types::*;

impl QueryBuilder {
    /// INNER JOIN `target` ON `left = right`
    pub fn join(self, target: impl Into<TableSource>, left: &str, right: &str) -> Self {
        self.join_with(JoinType::Inner, target, |on| on.where_column(left, QueryOperator::Equal, right))
    }

    /// LEFT JOIN `target` ON `left = right`
    pub fn left_join(self, target: impl Into<TableSource>, left: &str, right: &str) -> Self {
        self.join_with(JoinType::Left, target, |on| on.where_column(left, QueryOperator::Equal, right))
    }

    /// Join a nested query under `alias`; its parameters are numbered in place
    pub fn join_sub(self, query: QueryBuilder, alias: &str, left: &str, right: &str) -> Self {
        self.join(TableSource::subquery(query, alias), left, right)
    }

    pub fn left_join_sub(self, query: QueryBuilder, alias: &str, left: &str, right: &str) -> Self {
        self.left_join(TableSource::subquery(query, alias), left, right)
    }

    /// Join with an arbitrary ON predicate built by `on`
    pub fn join_with<F>(mut self, join_type: JoinType, target: impl Into<TableSource>, on: F) -> Self
    where
        F: FnOnce(ConditionBuilder) -> ConditionBuilder,
    {
        self.joins.push(JoinClause {
            join_type,
            target: target.into(),
            on: on(ConditionBuilder::new()),
        });
        self
    }
}
