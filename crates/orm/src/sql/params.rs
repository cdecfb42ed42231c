//! Parameter numbering and compiled statements

use std::fmt;

use super::SqlDialect;
use crate::backends::DatabaseValue;

/// Shared, monotonically advancing parameter counter for one statement.
///
/// Every fragment of a statement (outer query, subqueries, join predicates,
/// weighted expressions) binds through the same context, so placeholder
/// numbers never collide however deeply queries are nested.
#[derive(Debug, Clone)]
pub struct ParameterContext {
    dialect: SqlDialect,
    params: Vec<DatabaseValue>,
    names: Vec<String>,
}

impl ParameterContext {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Reserve the next slot for `value` and return its placeholder.
    ///
    /// NULL is written inline and takes no slot; a typed null parameter would
    /// not be assignable to columns of every type.
    pub fn bind(&mut self, value: impl Into<DatabaseValue>) -> String {
        let value = value.into();
        if value.is_null() {
            return "NULL".to_string();
        }
        self.params.push(value);
        let n = self.params.len();
        if self.dialect.uses_named_parameters() {
            self.names.push(format!("param{}", n));
        }
        self.dialect.placeholder(n)
    }

    /// Number of parameters bound so far
    pub fn count(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }

    /// Finish the statement
    pub fn into_statement(self, sql: String, kind: StatementKind) -> CompiledStatement {
        CompiledStatement {
            sql,
            params: self.params,
            names: self.names,
            kind,
            returning: None,
        }
    }
}

/// What a compiled statement does, so backends pick the right driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Raw,
}

/// Dialect-specific SQL text plus its ordered parameter list
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
    /// Parameter names, only populated for named-parameter dialects
    pub names: Vec<String>,
    pub kind: StatementKind,
    /// Primary key column whose generated value an INSERT reports back
    pub returning: Option<String>,
}

impl CompiledStatement {
    /// Wrap caller-written SQL whose placeholders are already in the dialect's style
    pub fn raw(dialect: SqlDialect, sql: impl Into<String>, params: Vec<DatabaseValue>) -> Self {
        let names = if dialect.uses_named_parameters() {
            (1..=params.len()).map(|n| format!("param{}", n)).collect()
        } else {
            Vec::new()
        };
        Self {
            sql: sql.into(),
            params,
            names,
            kind: StatementKind::Raw,
            returning: None,
        }
    }

    pub fn with_returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_dialect_records_parameter_names() {
        let mut ctx = ParameterContext::new(SqlDialect::MsSql);
        assert_eq!(ctx.bind(1), "@param1");
        assert_eq!(ctx.bind("x"), "@param2");

        let stmt = ctx.into_statement("SELECT 1".to_string(), StatementKind::Select);
        assert_eq!(stmt.names, vec!["param1", "param2"]);
        assert_eq!(stmt.param_count(), 2);
    }

    #[test]
    fn test_null_is_inlined_without_a_slot() {
        let mut ctx = ParameterContext::new(SqlDialect::Postgres);
        assert_eq!(ctx.bind(DatabaseValue::Null), "NULL");
        assert_eq!(ctx.bind(4), "$1");
        assert_eq!(ctx.params(), &[DatabaseValue::Int32(4)]);
    }

    #[test]
    fn test_ordinal_dialects_leave_names_empty() {
        let mut ctx = ParameterContext::new(SqlDialect::Postgres);
        assert_eq!(ctx.bind(1), "$1");
        assert_eq!(ctx.bind(2), "$2");
        let stmt = ctx.into_statement(String::new(), StatementKind::Select);
        assert!(stmt.names.is_empty());
    }

    #[test]
    fn test_raw_statement_names_follow_param_count() {
        let stmt = CompiledStatement::raw(
            SqlDialect::MsSql,
            "SELECT * FROM users WHERE id = @param1",
            vec![DatabaseValue::Int64(7)],
        );
        assert_eq!(stmt.names, vec!["param1"]);
        assert_eq!(stmt.kind, StatementKind::Raw);
    }
}
