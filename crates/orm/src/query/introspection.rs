//! Catalog lookups: does a table, column, trigger or stored procedure exist

use super::builder::QueryBuilder;
use super::execution::read_count;
use crate::error::ModelResult;
use crate::sql::{CompiledStatement, ParameterContext, SqlDialect, StatementKind};

impl QueryBuilder {
    pub async fn does_table_exist(&self, table: &str) -> ModelResult<bool> {
        self.catalog_lookup(table_exists_statement(self.dialect, table)).await
    }

    pub async fn does_column_exist(&self, table: &str, column: &str) -> ModelResult<bool> {
        self.catalog_lookup(column_exists_statement(self.dialect, table, column))
            .await
    }

    pub async fn does_trigger_exist(&self, trigger: &str) -> ModelResult<bool> {
        self.catalog_lookup(trigger_exists_statement(self.dialect, trigger))
            .await
    }

    pub async fn does_stored_procedure_exist(&self, procedure: &str) -> ModelResult<bool> {
        self.catalog_lookup(procedure_exists_statement(self.dialect, procedure))
            .await
    }

    async fn catalog_lookup(&self, statement: CompiledStatement) -> ModelResult<bool> {
        let rows = self.fetch_statement(&statement).await?;
        Ok(rows.first().map(read_count).unwrap_or(0) > 0)
    }
}

/// Predicate restricting a catalog view to the connection's own schema
fn schema_filter(dialect: SqlDialect, column: &str) -> String {
    match dialect {
        SqlDialect::MySql => format!("{} = DATABASE()", column),
        SqlDialect::Postgres => format!("{} = current_schema()", column),
        SqlDialect::MsSql => format!("{} = SCHEMA_NAME()", column),
    }
}

pub(crate) fn table_exists_statement(dialect: SqlDialect, table: &str) -> CompiledStatement {
    let mut ctx = ParameterContext::new(dialect);
    let sql = format!(
        "SELECT COUNT(*) AS total FROM information_schema.tables WHERE {} AND table_name = {}",
        schema_filter(dialect, "table_schema"),
        ctx.bind(table)
    );
    ctx.into_statement(sql, StatementKind::Select)
}

pub(crate) fn column_exists_statement(dialect: SqlDialect, table: &str, column: &str) -> CompiledStatement {
    let mut ctx = ParameterContext::new(dialect);
    let sql = format!(
        "SELECT COUNT(*) AS total FROM information_schema.columns WHERE {} AND table_name = {} AND column_name = {}",
        schema_filter(dialect, "table_schema"),
        ctx.bind(table),
        ctx.bind(column)
    );
    ctx.into_statement(sql, StatementKind::Select)
}

pub(crate) fn trigger_exists_statement(dialect: SqlDialect, trigger: &str) -> CompiledStatement {
    let mut ctx = ParameterContext::new(dialect);
    let sql = match dialect {
        SqlDialect::MsSql => format!("SELECT COUNT(*) AS total FROM sys.triggers WHERE name = {}", ctx.bind(trigger)),
        _ => format!(
            "SELECT COUNT(*) AS total FROM information_schema.triggers WHERE {} AND trigger_name = {}",
            schema_filter(dialect, "trigger_schema"),
            ctx.bind(trigger)
        ),
    };
    ctx.into_statement(sql, StatementKind::Select)
}

pub(crate) fn procedure_exists_statement(dialect: SqlDialect, procedure: &str) -> CompiledStatement {
    let mut ctx = ParameterContext::new(dialect);
    let sql = match dialect {
        SqlDialect::MsSql => format!(
            "SELECT COUNT(*) AS total FROM sys.procedures WHERE name = {}",
            ctx.bind(procedure)
        ),
        _ => format!(
            "SELECT COUNT(*) AS total FROM information_schema.routines WHERE {} \
             AND routine_type = 'PROCEDURE' AND routine_name = {}",
            schema_filter(dialect, "routine_schema"),
            ctx.bind(procedure)
        ),
    };
    ctx.into_statement(sql, StatementKind::Select)
}
