//! Query Builder WHERE clause operations
//!
//! Thin delegates onto the builder's [`ConditionBuilder`]; field names are
//! escaped for the builder's dialect when the statement is compiled.

use super::builder::QueryBuilder;
use super::condition::ConditionBuilder;
use super::types::QueryOperator;
use super::weighted::{Otherwise, WeightedCondition};
use crate::backends::DatabaseValue;

impl QueryBuilder {
    fn map_conditions(mut self, f: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.conditions = f(std::mem::take(&mut self.conditions));
        self
    }

    /// Add `field op value`; with `escape` the value is bound, otherwise inlined as written
    pub fn where_op(
        self,
        field: &str,
        operator: QueryOperator,
        value: impl Into<DatabaseValue>,
        escape: bool,
    ) -> Self {
        self.map_conditions(|c| c.where_op(field, operator, value, escape))
    }

    /// Add WHERE condition with equality
    pub fn where_eq(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::Equal, value, true)
    }

    pub fn where_ne(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::NotEqual, value, true)
    }

    pub fn where_gt(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::GreaterThan, value, true)
    }

    pub fn where_gte(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::GreaterThanOrEqual, value, true)
    }

    pub fn where_lt(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::LessThan, value, true)
    }

    pub fn where_lte(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::LessThanOrEqual, value, true)
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, field: &str, pattern: &str) -> Self {
        self.where_op(field, QueryOperator::Like, pattern, true)
    }

    pub fn where_not_like(self, field: &str, pattern: &str) -> Self {
        self.where_op(field, QueryOperator::NotLike, pattern, true)
    }

    /// Compare two columns
    pub fn where_column(self, left: &str, operator: QueryOperator, right: &str) -> Self {
        self.map_conditions(|c| c.where_column(left, operator, right))
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(self, field: &str) -> Self {
        self.map_conditions(|c| c.where_null(field))
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(self, field: &str) -> Self {
        self.map_conditions(|c| c.where_not_null(field))
    }

    /// Add WHERE condition with IN over literal values
    pub fn where_in<V: Into<DatabaseValue>>(self, field: &str, values: Vec<V>, escape: bool) -> Self {
        self.map_conditions(|c| c.where_in(field, values, escape))
    }

    pub fn where_not_in<V: Into<DatabaseValue>>(self, field: &str, values: Vec<V>, escape: bool) -> Self {
        self.map_conditions(|c| c.where_not_in(field, values, escape))
    }

    /// Add WHERE condition with IN over a subquery
    pub fn where_in_sub(self, field: &str, subquery: QueryBuilder) -> Self {
        self.map_conditions(|c| c.where_in_sub(field, subquery))
    }

    pub fn where_not_in_sub(self, field: &str, subquery: QueryBuilder) -> Self {
        self.map_conditions(|c| c.where_not_in_sub(field, subquery))
    }

    pub fn where_between(
        self,
        field: &str,
        low: impl Into<DatabaseValue>,
        high: impl Into<DatabaseValue>,
    ) -> Self {
        self.map_conditions(|c| c.where_between(field, low, high))
    }

    /// Join the next clause with OR
    pub fn or(self) -> Self {
        self.map_conditions(ConditionBuilder::or)
    }

    /// Join the next clause with AND
    pub fn and(self) -> Self {
        self.map_conditions(ConditionBuilder::and)
    }

    pub fn open_bracket(self) -> Self {
        self.map_conditions(ConditionBuilder::open_bracket)
    }

    pub fn close_bracket(self) -> Self {
        self.map_conditions(ConditionBuilder::close_bracket)
    }

    /// Bracket the predicate built so far if it contains an OR
    pub fn group_conditions(self) -> Self {
        self.map_conditions(ConditionBuilder::grouped)
    }

    /// Score rows by `field op value`: `weight` on match, `otherwise` on miss
    pub fn weighted_where(
        self,
        field: &str,
        operator: QueryOperator,
        value: impl Into<DatabaseValue>,
        weight: f64,
        otherwise: f64,
        escape: bool,
    ) -> Self {
        self.weighted(WeightedCondition::new(field, operator, value, escape, weight, otherwise))
    }

    /// Like [`weighted_where`](Self::weighted_where) with a nested condition scoring the misses
    pub fn sub_weighted_where(
        self,
        field: &str,
        operator: QueryOperator,
        value: impl Into<DatabaseValue>,
        weight: f64,
        nested: WeightedCondition,
        escape: bool,
    ) -> Self {
        self.weighted(WeightedCondition::new(
            field,
            operator,
            value,
            escape,
            weight,
            Otherwise::Nested(Box::new(nested)),
        ))
    }

    /// Attach a prepared weighted condition
    pub fn weighted(mut self, condition: WeightedCondition) -> Self {
        self.weighted.push(condition);
        self
    }
}
