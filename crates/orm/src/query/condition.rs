//! Condition Builder
//!
//! An ordered, dialect-independent predicate. Nodes are recorded as they are
//! appended and only turned into SQL by [`ConditionBuilder::compile`], which
//! binds values through the statement's shared [`ParameterContext`].
//!
//! Connector rules:
//! - clauses are joined with `AND` unless `or()` was called just before;
//! - `or()`/`and()` affect only the next clause or opening bracket;
//! - no connector is written before the first token or right after `(`;
//! - a connector still pending at `)` is discarded.

use super::builder::QueryBuilder;
use super::types::QueryOperator;
use crate::backends::DatabaseValue;
use crate::error::ModelResult;
use crate::sql::ParameterContext;

/// Logical connector between two clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOperator {
    And,
    Or,
}

impl LogicOperator {
    fn as_sql(&self) -> &'static str {
        match self {
            LogicOperator::And => " AND ",
            LogicOperator::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Open,
    Close,
}

/// Members of an IN / NOT IN clause
#[derive(Debug, Clone)]
pub enum InSet {
    /// Literal values; bound as parameters when `escape`, inlined as SQL literals otherwise
    Values { values: Vec<DatabaseValue>, escape: bool },
    Subquery(Box<QueryBuilder>),
}

/// One token of a predicate
#[derive(Debug, Clone)]
pub enum ConditionNode {
    /// `field op value`; an unescaped value is written into the SQL as-is
    Comparison {
        field: String,
        operator: QueryOperator,
        value: DatabaseValue,
        escape: bool,
    },
    NullCheck { field: String, is_null: bool },
    InSet { field: String, negated: bool, set: InSet },
    Between { field: String, low: DatabaseValue, high: DatabaseValue },
    Logic(LogicOperator),
    Bracket(Bracket),
}

impl ConditionNode {
    fn is_clause(&self) -> bool {
        !matches!(self, ConditionNode::Logic(_) | ConditionNode::Bracket(_))
    }
}

/// Ordered predicate builder
#[derive(Debug, Clone, Default)]
pub struct ConditionBuilder {
    nodes: Vec<ConditionNode>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[ConditionNode] {
        &self.nodes
    }

    /// Whether at least one clause has been appended
    pub fn has_clauses(&self) -> bool {
        self.nodes.iter().any(ConditionNode::is_clause)
    }

    pub(crate) fn push(&mut self, node: ConditionNode) {
        self.nodes.push(node);
    }

    /// Wrap the predicate in brackets when it contains an OR, so clauses appended
    /// later with AND constrain every alternative
    pub fn grouped(mut self) -> Self {
        let disjunctive = self
            .nodes
            .iter()
            .any(|node| matches!(node, ConditionNode::Logic(LogicOperator::Or)));
        if disjunctive && self.has_clauses() {
            self.nodes.insert(0, ConditionNode::Bracket(Bracket::Open));
            self.nodes.push(ConditionNode::Bracket(Bracket::Close));
        }
        self
    }

    /// Append `field op value`
    pub fn where_op(
        mut self,
        field: &str,
        operator: QueryOperator,
        value: impl Into<DatabaseValue>,
        escape: bool,
    ) -> Self {
        self.push(ConditionNode::Comparison {
            field: field.to_string(),
            operator,
            value: value.into(),
            escape,
        });
        self
    }

    /// Append `field = value` with a bound value
    pub fn where_eq(self, field: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_op(field, QueryOperator::Equal, value, true)
    }

    /// Column-to-column comparison, e.g. join conditions
    pub fn where_column(self, left: &str, operator: QueryOperator, right: &str) -> Self {
        self.where_op(left, operator, right, false)
    }

    pub fn where_null(mut self, field: &str) -> Self {
        self.push(ConditionNode::NullCheck {
            field: field.to_string(),
            is_null: true,
        });
        self
    }

    pub fn where_not_null(mut self, field: &str) -> Self {
        self.push(ConditionNode::NullCheck {
            field: field.to_string(),
            is_null: false,
        });
        self
    }

    pub fn where_in<V: Into<DatabaseValue>>(mut self, field: &str, values: Vec<V>, escape: bool) -> Self {
        self.push(ConditionNode::InSet {
            field: field.to_string(),
            negated: false,
            set: InSet::Values {
                values: values.into_iter().map(Into::into).collect(),
                escape,
            },
        });
        self
    }

    pub fn where_not_in<V: Into<DatabaseValue>>(mut self, field: &str, values: Vec<V>, escape: bool) -> Self {
        self.push(ConditionNode::InSet {
            field: field.to_string(),
            negated: true,
            set: InSet::Values {
                values: values.into_iter().map(Into::into).collect(),
                escape,
            },
        });
        self
    }

    /// `field IN (<subquery>)`; the subquery shares this statement's parameter numbering
    pub fn where_in_sub(mut self, field: &str, subquery: QueryBuilder) -> Self {
        self.push(ConditionNode::InSet {
            field: field.to_string(),
            negated: false,
            set: InSet::Subquery(Box::new(subquery)),
        });
        self
    }

    pub fn where_not_in_sub(mut self, field: &str, subquery: QueryBuilder) -> Self {
        self.push(ConditionNode::InSet {
            field: field.to_string(),
            negated: true,
            set: InSet::Subquery(Box::new(subquery)),
        });
        self
    }

    pub fn where_between(
        mut self,
        field: &str,
        low: impl Into<DatabaseValue>,
        high: impl Into<DatabaseValue>,
    ) -> Self {
        self.push(ConditionNode::Between {
            field: field.to_string(),
            low: low.into(),
            high: high.into(),
        });
        self
    }

    /// Join the next clause with OR
    pub fn or(mut self) -> Self {
        self.push(ConditionNode::Logic(LogicOperator::Or));
        self
    }

    /// Join the next clause with AND
    pub fn and(mut self) -> Self {
        self.push(ConditionNode::Logic(LogicOperator::And));
        self
    }

    pub fn open_bracket(mut self) -> Self {
        self.push(ConditionNode::Bracket(Bracket::Open));
        self
    }

    pub fn close_bracket(mut self) -> Self {
        self.push(ConditionNode::Bracket(Bracket::Close));
        self
    }

    /// Render the predicate, binding escaped values through `ctx` in order
    pub fn compile(&self, ctx: &mut ParameterContext) -> ModelResult<String> {
        let mut sql = String::new();
        let mut pending: Option<LogicOperator> = None;
        let mut needs_connector = false;

        for node in &self.nodes {
            match node {
                ConditionNode::Logic(op) => pending = Some(*op),
                ConditionNode::Bracket(Bracket::Open) => {
                    if needs_connector {
                        sql.push_str(pending.unwrap_or(LogicOperator::And).as_sql());
                    }
                    pending = None;
                    sql.push('(');
                    needs_connector = false;
                }
                ConditionNode::Bracket(Bracket::Close) => {
                    pending = None;
                    sql.push(')');
                    needs_connector = true;
                }
                clause => {
                    if needs_connector {
                        sql.push_str(pending.unwrap_or(LogicOperator::And).as_sql());
                    }
                    pending = None;
                    sql.push_str(&compile_clause(clause, ctx)?);
                    needs_connector = true;
                }
            }
        }

        Ok(sql)
    }
}

fn compile_clause(node: &ConditionNode, ctx: &mut ParameterContext) -> ModelResult<String> {
    let dialect = ctx.dialect();
    let clause = match node {
        ConditionNode::Comparison {
            field,
            operator,
            value,
            escape,
        } => {
            let rendered = if *escape {
                ctx.bind(value.clone())
            } else {
                inline_operand(ctx, value)
            };
            format!("{} {} {}", dialect.escape_identifier(field), operator, rendered)
        }
        ConditionNode::NullCheck { field, is_null } => {
            let check = if *is_null { "IS NULL" } else { "IS NOT NULL" };
            format!("{} {}", dialect.escape_identifier(field), check)
        }
        ConditionNode::InSet { field, negated, set } => {
            let keyword = if *negated { "NOT IN" } else { "IN" };
            match set {
                InSet::Values { values, .. } if values.is_empty() => {
                    (if *negated { "1 = 1" } else { "1 = 0" }).to_string()
                }
                InSet::Values { values, escape } => {
                    let members: Vec<String> = values
                        .iter()
                        .map(|value| {
                            if *escape {
                                ctx.bind(value.clone())
                            } else {
                                dialect.literal(value)
                            }
                        })
                        .collect();
                    format!("{} {} ({})", dialect.escape_identifier(field), keyword, members.join(", "))
                }
                InSet::Subquery(query) => {
                    let inner = query.write_select(ctx)?;
                    format!("{} {} ({})", dialect.escape_identifier(field), keyword, inner)
                }
            }
        }
        ConditionNode::Between { field, low, high } => {
            let low = ctx.bind(low.clone());
            let high = ctx.bind(high.clone());
            format!("{} BETWEEN {} AND {}", dialect.escape_identifier(field), low, high)
        }
        ConditionNode::Logic(_) | ConditionNode::Bracket(_) => String::new(),
    };
    Ok(clause)
}

/// Unescaped operands: text is a column or expression, anything else a literal
fn inline_operand(ctx: &ParameterContext, value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::String(text) => ctx.dialect().escape_identifier(text),
        other => ctx.dialect().literal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlDialect;

    fn compile(builder: &ConditionBuilder, dialect: SqlDialect) -> (String, usize) {
        let mut ctx = ParameterContext::new(dialect);
        let sql = builder.compile(&mut ctx).unwrap();
        (sql, ctx.count())
    }

    #[test]
    fn test_default_connector_is_and() {
        let c = ConditionBuilder::new().where_eq("a", 1).where_eq("b", 2);
        assert_eq!(compile(&c, SqlDialect::MySql).0, "a = ? AND b = ?");
    }

    #[test]
    fn test_or_applies_to_next_clause_only() {
        let c = ConditionBuilder::new()
            .where_eq("a", 1)
            .or()
            .where_eq("b", 2)
            .where_eq("c", 3);
        assert_eq!(compile(&c, SqlDialect::Postgres).0, "a = $1 OR b = $2 AND c = $3");
    }

    #[test]
    fn test_connector_suppressed_at_start_and_after_open_bracket() {
        let c = ConditionBuilder::new()
            .or()
            .open_bracket()
            .where_eq("a", 1)
            .or()
            .where_eq("b", 2)
            .close_bracket()
            .open_bracket()
            .where_null("c")
            .close_bracket();
        assert_eq!(
            compile(&c, SqlDialect::MsSql).0,
            "(a = @param1 OR b = @param2) AND (c IS NULL)"
        );
    }

    #[test]
    fn test_or_before_bracket_joins_the_group() {
        let c = ConditionBuilder::new()
            .where_eq("a", 1)
            .or()
            .open_bracket()
            .where_eq("b", 2)
            .where_eq("c", 3)
            .close_bracket();
        assert_eq!(compile(&c, SqlDialect::MySql).0, "a = ? OR (b = ? AND c = ?)");
    }

    #[test]
    fn test_pending_connector_dropped_at_close_bracket() {
        let c = ConditionBuilder::new()
            .open_bracket()
            .where_eq("a", 1)
            .or()
            .close_bracket()
            .where_eq("b", 2);
        assert_eq!(compile(&c, SqlDialect::MySql).0, "(a = ?) AND b = ?");
    }

    #[test]
    fn test_grouped_brackets_only_disjunctions() {
        let either = ConditionBuilder::new()
            .where_eq("name", "Oslo")
            .or()
            .where_eq("name", "Bergen")
            .grouped()
            .where_in("id", vec![1, 2], true);
        assert_eq!(
            compile(&either, SqlDialect::Postgres).0,
            "(name = $1 OR name = $2) AND id IN ($3, $4)"
        );

        let both = ConditionBuilder::new().where_eq("a", 1).where_eq("b", 2).grouped();
        assert_eq!(compile(&both, SqlDialect::MySql).0, "a = ? AND b = ?");
        assert!(!ConditionBuilder::new().or().grouped().has_clauses());
    }

    #[test]
    fn test_unescaped_comparison_inlines_column() {
        let c = ConditionBuilder::new().where_column("users.city_id", QueryOperator::Equal, "cities.id");
        let (sql, count) = compile(&c, SqlDialect::MySql);
        assert_eq!(sql, "users.city_id = cities.id");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_unescaped_in_renders_literals_not_identifiers() {
        let c = ConditionBuilder::new().where_in("status", vec!["open", "it's"], false);
        for dialect in [SqlDialect::MySql, SqlDialect::MsSql, SqlDialect::Postgres] {
            let (sql, count) = compile(&c, dialect);
            assert_eq!(sql, "status IN ('open', 'it''s')");
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_empty_in_lists_are_constant() {
        let c = ConditionBuilder::new()
            .where_in::<i64>("id", vec![], true)
            .where_not_in::<i64>("id", vec![], true);
        assert_eq!(compile(&c, SqlDialect::MySql).0, "1 = 0 AND 1 = 1");
    }

    #[test]
    fn test_reserved_field_names_are_quoted() {
        let c = ConditionBuilder::new().where_eq("order", 5).where_not_null("group");
        assert_eq!(compile(&c, SqlDialect::MsSql).0, "[order] = @param1 AND [group] IS NOT NULL");
    }

    #[test]
    fn test_between_binds_both_bounds() {
        let c = ConditionBuilder::new().where_between("age", 18, 30);
        let (sql, count) = compile(&c, SqlDialect::Postgres);
        assert_eq!(sql, "age BETWEEN $1 AND $2");
        assert_eq!(count, 2);
    }
}
