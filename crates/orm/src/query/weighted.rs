//! Weighted conditions for ranking queries
//!
//! A weighted condition scores a row: `weight` when its predicate matches,
//! otherwise either a constant or the score of another weighted condition.
//! Several weighted conditions on one statement are summed into a single
//! `__weight` column that the statement is ordered by, best match first.

use super::condition::ConditionBuilder;
use super::types::QueryOperator;
use crate::backends::DatabaseValue;
use crate::error::ModelResult;
use crate::sql::ParameterContext;

/// Alias of the synthesized ranking column
pub const WEIGHT_COLUMN: &str = "__weight";

/// Score of a row that does not match
#[derive(Debug, Clone)]
pub enum Otherwise {
    Weight(f64),
    Nested(Box<WeightedCondition>),
}

impl From<f64> for Otherwise {
    fn from(weight: f64) -> Self {
        Otherwise::Weight(weight)
    }
}

impl From<i32> for Otherwise {
    fn from(weight: i32) -> Self {
        Otherwise::Weight(f64::from(weight))
    }
}

impl From<WeightedCondition> for Otherwise {
    fn from(nested: WeightedCondition) -> Self {
        Otherwise::Nested(Box::new(nested))
    }
}

#[derive(Debug, Clone)]
pub struct WeightedCondition {
    condition: ConditionBuilder,
    weight: f64,
    otherwise: Otherwise,
}

impl WeightedCondition {
    /// Score `weight` when `field op value` holds
    pub fn new(
        field: &str,
        operator: QueryOperator,
        value: impl Into<DatabaseValue>,
        escape: bool,
        weight: f64,
        otherwise: impl Into<Otherwise>,
    ) -> Self {
        Self::from_condition(
            ConditionBuilder::new().where_op(field, operator, value, escape),
            weight,
            otherwise,
        )
    }

    /// Score `weight` when an arbitrary predicate holds
    pub fn from_condition(condition: ConditionBuilder, weight: f64, otherwise: impl Into<Otherwise>) -> Self {
        Self {
            condition,
            weight,
            otherwise: otherwise.into(),
        }
    }

    /// Nesting depth, counting this condition
    pub fn depth(&self) -> usize {
        match &self.otherwise {
            Otherwise::Weight(_) => 1,
            Otherwise::Nested(inner) => 1 + inner.depth(),
        }
    }

    /// Render the conditional expression, binding values in textual order
    pub fn compile(&self, ctx: &mut ParameterContext) -> ModelResult<String> {
        let condition = self.condition.compile(ctx)?;
        let otherwise = match &self.otherwise {
            Otherwise::Weight(weight) => format_weight(*weight),
            Otherwise::Nested(inner) => inner.compile(ctx)?,
        };
        Ok(ctx
            .dialect()
            .conditional(&condition, &format_weight(self.weight), &otherwise))
    }
}

/// Sum of every weighted condition, aliased as the ranking column
pub(crate) fn compile_weight_column(
    conditions: &[WeightedCondition],
    ctx: &mut ParameterContext,
) -> ModelResult<Option<String>> {
    if conditions.is_empty() {
        return Ok(None);
    }
    let mut terms = Vec::with_capacity(conditions.len());
    for condition in conditions {
        terms.push(condition.compile(ctx)?);
    }
    let expression = if terms.len() == 1 {
        terms.remove(0)
    } else {
        format!("({})", terms.join(" + "))
    };
    Ok(Some(format!("{} AS {}", expression, WEIGHT_COLUMN)))
}

fn format_weight(weight: f64) -> String {
    weight.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlDialect;

    #[test]
    fn test_nested_otherwise_uses_dialect_conditional() {
        let inner = WeightedCondition::new("last_name", QueryOperator::Like, "smi%", true, 2.0, 0);
        let outer = WeightedCondition::new("first_name", QueryOperator::Equal, "john", true, 5.0, inner);
        assert_eq!(outer.depth(), 2);

        let mut ctx = ParameterContext::new(SqlDialect::MySql);
        assert_eq!(
            outer.compile(&mut ctx).unwrap(),
            "IF(first_name = ?, 5, IF(last_name LIKE ?, 2, 0))"
        );

        let mut ctx = ParameterContext::new(SqlDialect::Postgres);
        assert_eq!(
            outer.compile(&mut ctx).unwrap(),
            "CASE WHEN first_name = $1 THEN 5 ELSE CASE WHEN last_name LIKE $2 THEN 2 ELSE 0 END END"
        );
        assert_eq!(ctx.params()[1], DatabaseValue::from("smi%"));
    }

    #[test]
    fn test_multiple_conditions_sum_into_one_column() {
        let conditions = vec![
            WeightedCondition::new("a", QueryOperator::Equal, 1, true, 1.0, 0),
            WeightedCondition::new("b", QueryOperator::Equal, 2, true, 0.5, 0),
        ];
        let mut ctx = ParameterContext::new(SqlDialect::MsSql);
        let column = compile_weight_column(&conditions, &mut ctx).unwrap().unwrap();
        assert_eq!(
            column,
            "(CASE WHEN a = @param1 THEN 1 ELSE 0 END + CASE WHEN b = @param2 THEN 0.5 ELSE 0 END) AS __weight"
        );
    }
}
