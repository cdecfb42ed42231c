//! Query Builder SQL generation
//!
//! Every `generate_*` method compiles from scratch into a fresh
//! [`ParameterContext`]; nested queries write into the caller's context so
//! the whole statement shares one parameter sequence in textual order.

use super::builder::QueryBuilder;
use super::types::*;
use super::weighted::{compile_weight_column, WEIGHT_COLUMN};
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};
use crate::sql::{CompiledStatement, ParameterContext, SqlDialect, StatementKind};

impl QueryBuilder {
    /// Compile the SELECT statement
    pub fn generate_select(&self) -> ModelResult<CompiledStatement> {
        let mut ctx = ParameterContext::new(self.dialect);
        let sql = self.write_select_parts(&mut ctx, true)?;
        Ok(ctx.into_statement(sql, StatementKind::Select))
    }

    /// Compile `SELECT COUNT(*)` over the current SELECT
    pub fn generate_count(&self) -> ModelResult<CompiledStatement> {
        let mut ctx = ParameterContext::new(self.dialect);
        let paged = self.limit_count.is_some() || self.offset_value.is_some();
        let inner = self.write_select_parts(&mut ctx, paged)?;
        let sql = format!("SELECT COUNT(*) AS total FROM ({}) AS count_sql", inner);
        Ok(ctx.into_statement(sql, StatementKind::Select))
    }

    /// Compile the staged INSERT
    pub fn generate_insert(&self) -> ModelResult<CompiledStatement> {
        let table = self.write_table_name("INSERT")?;
        let (rows, escape) = match &self.payload {
            Some(WritePayload::Insert { rows, escape }) => (rows, *escape),
            _ => return Err(ModelError::Usage("insert() has not been called on this query".to_string())),
        };

        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for (column, _) in row {
                if !columns.contains(&column.as_str()) {
                    columns.push(column);
                }
            }
        }
        if columns.is_empty() {
            return Err(ModelError::Usage(format!("INSERT into {} has no columns", table)));
        }

        let mut ctx = ParameterContext::new(self.dialect);
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let values: Vec<String> = columns
                .iter()
                .map(|column| match row.iter().find(|(c, _)| c == column) {
                    Some((_, value)) => render_value(&mut ctx, value, escape),
                    None => "DEFAULT".to_string(),
                })
                .collect();
            tuples.push(format!("({})", values.join(", ")));
        }

        let column_list: Vec<String> = columns
            .iter()
            .map(|c| self.dialect.escape_identifier(c))
            .collect();
        let mut sql = format!("INSERT INTO {} ({})", table, column_list.join(", "));
        if let (SqlDialect::MsSql, Some(pk)) = (self.dialect, &self.returning) {
            sql.push_str(&format!(" OUTPUT INSERTED.{}", self.dialect.escape_identifier(pk)));
        }
        sql.push_str(" VALUES ");
        sql.push_str(&tuples.join(", "));
        if let (SqlDialect::Postgres, Some(pk)) = (self.dialect, &self.returning) {
            sql.push_str(&format!(" RETURNING {}", self.dialect.escape_identifier(pk)));
        }

        let mut statement = ctx.into_statement(sql, StatementKind::Insert);
        statement.returning = self.returning.clone();
        Ok(statement)
    }

    /// Compile the staged UPDATE, scoped by the accumulated predicate
    pub fn generate_update(&self) -> ModelResult<CompiledStatement> {
        let table = self.write_table_name("UPDATE")?;
        let (values, escape) = match &self.payload {
            Some(WritePayload::Update { values, escape }) => (values, *escape),
            _ => return Err(ModelError::Usage("update() has not been called on this query".to_string())),
        };
        if values.is_empty() {
            return Err(ModelError::Usage(format!("UPDATE of {} sets no columns", table)));
        }

        let mut ctx = ParameterContext::new(self.dialect);
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    self.dialect.escape_identifier(column),
                    render_value(&mut ctx, value, escape)
                )
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
        self.write_where(&mut sql, &mut ctx)?;
        Ok(ctx.into_statement(sql, StatementKind::Update))
    }

    /// Compile a DELETE scoped by the accumulated predicate
    pub fn generate_delete(&self) -> ModelResult<CompiledStatement> {
        let table = self.write_table_name("DELETE")?;
        let mut ctx = ParameterContext::new(self.dialect);
        let mut sql = format!("DELETE FROM {}", table);
        self.write_where(&mut sql, &mut ctx)?;
        Ok(ctx.into_statement(sql, StatementKind::Delete))
    }

    /// Compile whichever write is staged
    pub fn generate_save(&self) -> ModelResult<CompiledStatement> {
        match &self.payload {
            Some(WritePayload::Insert { .. }) => self.generate_insert(),
            Some(WritePayload::Update { .. }) => self.generate_update(),
            None => Err(ModelError::Usage(
                "save() requires insert() or update() to be called first".to_string(),
            )),
        }
    }

    /// Write this SELECT nested in another statement, sharing its parameter context.
    ///
    /// SQL Server rejects ORDER BY in derived tables and IN subqueries unless the
    /// select is paged, so unpaged nested selects drop their ordering there.
    pub(crate) fn write_select(&self, ctx: &mut ParameterContext) -> ModelResult<String> {
        let paged = self.limit_count.is_some() || self.offset_value.is_some();
        self.write_select_parts(ctx, paged || self.dialect != SqlDialect::MsSql)
    }

    fn write_select_parts(&self, ctx: &mut ParameterContext, with_order: bool) -> ModelResult<String> {
        let dialect = self.dialect;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ModelError::Usage("table() has not been called on this query".to_string()))?;

        let mut sql = String::from(if self.distinct { "SELECT DISTINCT " } else { "SELECT " });

        let mut projection: Vec<String> = if self.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.columns.iter().map(|c| dialect.escape_identifier(c)).collect()
        };
        if let Some(weight) = compile_weight_column(&self.weighted, ctx)? {
            projection.push(weight);
        }
        sql.push_str(&projection.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&write_source(source, ctx)?);

        for join in &self.joins {
            sql.push_str(&format!(" {} {}", join.join_type, write_source(&join.target, ctx)?));
            if join.on.has_clauses() {
                sql.push_str(" ON ");
                sql.push_str(&join.on.compile(ctx)?);
            }
        }

        self.write_where(&mut sql, ctx)?;

        if !self.group_by.is_empty() {
            let fields: Vec<String> = self.group_by.iter().map(|f| dialect.escape_identifier(f)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&fields.join(", "));
        }

        let mut order: Vec<String> = Vec::new();
        if with_order {
            if !self.weighted.is_empty() {
                order.push(format!("{} {}", WEIGHT_COLUMN, OrderDirection::Desc));
            }
            for (column, direction) in &self.order_by {
                order.push(format!("{} {}", dialect.escape_identifier(column), direction));
            }
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        sql.push_str(&dialect.paging_clause(self.limit_count, self.offset_value, !order.is_empty()));
        Ok(sql)
    }

    fn write_where(&self, sql: &mut String, ctx: &mut ParameterContext) -> ModelResult<()> {
        if self.conditions.has_clauses() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.compile(ctx)?);
        }
        Ok(())
    }

    fn write_table_name(&self, verb: &str) -> ModelResult<String> {
        match &self.source {
            Some(TableSource::Named(name)) => Ok(self.dialect.escape_identifier(name)),
            Some(TableSource::Subquery { .. }) => {
                Err(ModelError::Usage(format!("{} cannot target a subquery", verb)))
            }
            None => Err(ModelError::Usage("table() has not been called on this query".to_string())),
        }
    }
}

fn write_source(source: &TableSource, ctx: &mut ParameterContext) -> ModelResult<String> {
    let dialect = ctx.dialect();
    match source {
        TableSource::Named(name) => Ok(dialect.escape_identifier(name)),
        TableSource::Subquery { query, alias } => {
            let inner = query.write_select(ctx)?;
            Ok(format!("({}) AS {}", inner, dialect.escape_identifier(alias)))
        }
    }
}

/// Bound placeholder, or the value written inline for unescaped writes
fn render_value(ctx: &mut ParameterContext, value: &DatabaseValue, escape: bool) -> String {
    if escape {
        return ctx.bind(value.clone());
    }
    match value {
        DatabaseValue::String(expression) => expression.clone(),
        other => ctx.dialect().literal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryOperator, WeightedCondition};
    use serde_json::json;

    fn record(value: serde_json::Value) -> crate::backends::Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_select_clause_order() {
        let q = QueryBuilder::new(SqlDialect::Postgres)
            .table("users")
            .cols(["users.id", "cities.name AS city"])
            .join("cities", "users.city_id", "cities.id")
            .where_eq("users.active", true)
            .group_by("users.id")
            .order_by_desc("users.id")
            .limit(10)
            .offset(20);
        let stmt = q.generate_select().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT users.id, cities.name AS city FROM users INNER JOIN cities ON users.city_id = cities.id \
             WHERE users.active = $1 GROUP BY users.id ORDER BY users.id DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(stmt.params, vec![DatabaseValue::Bool(true)]);
    }

    #[test]
    fn test_mssql_paging_follows_order_by() {
        let q = QueryBuilder::new(SqlDialect::MsSql)
            .table("users")
            .order_by("email")
            .limit(5)
            .offset(10);
        assert_eq!(
            q.generate_select().unwrap().sql,
            "SELECT * FROM users ORDER BY email ASC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_subquery_source_and_join_share_numbering() {
        let inner = QueryBuilder::new(SqlDialect::Postgres)
            .table("orders")
            .cols(["user_id"])
            .where_gt("total", 100);
        let joined = QueryBuilder::new(SqlDialect::Postgres)
            .table("cities")
            .where_eq("country", "NL");
        let q = QueryBuilder::new(SqlDialect::Postgres)
            .table_sub(inner, "big")
            .join_sub(joined, "c", "c.id", "big.user_id")
            .where_eq("big.user_id", 7);
        let stmt = q.generate_select().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM (SELECT user_id FROM orders WHERE total > $1) AS big \
             INNER JOIN (SELECT * FROM cities WHERE country = $2) AS c ON c.id = big.user_id \
             WHERE big.user_id = $3"
        );
        assert_eq!(stmt.param_count(), 3);
    }

    #[test]
    fn test_mssql_nested_selects_drop_unpaged_order() {
        let titles = QueryBuilder::new(SqlDialect::MsSql)
            .table("titles")
            .cols(["id"])
            .order_by("id");
        let q = QueryBuilder::new(SqlDialect::MsSql)
            .table("users")
            .where_in_sub("title_id", titles);
        assert_eq!(
            q.generate_select().unwrap().sql,
            "SELECT * FROM users WHERE title_id IN (SELECT id FROM titles)"
        );

        let ranked = QueryBuilder::new(SqlDialect::MsSql)
            .table("t")
            .weighted_where("a", QueryOperator::Equal, 1, 2.0, 0.0, true);
        let q = QueryBuilder::new(SqlDialect::MsSql).table_sub(ranked, "s");
        assert_eq!(
            q.generate_select().unwrap().sql,
            "SELECT * FROM (SELECT *, CASE WHEN a = @param1 THEN 2 ELSE 0 END AS __weight FROM t) AS s"
        );

        let cities = QueryBuilder::new(SqlDialect::MsSql)
            .table("cities")
            .order_by_desc("name");
        let q = QueryBuilder::new(SqlDialect::MsSql)
            .table("users")
            .join_sub(cities, "c", "c.id", "users.city_id");
        assert_eq!(
            q.generate_select().unwrap().sql,
            "SELECT * FROM users INNER JOIN (SELECT * FROM cities) AS c ON c.id = users.city_id"
        );
    }

    #[test]
    fn test_nested_order_kept_when_paged_or_not_mssql() {
        let recent = QueryBuilder::new(SqlDialect::MsSql)
            .table("orders")
            .order_by_desc("created_at")
            .limit(5);
        let q = QueryBuilder::new(SqlDialect::MsSql).table_sub(recent, "r");
        assert_eq!(
            q.generate_select().unwrap().sql,
            "SELECT * FROM (SELECT * FROM orders ORDER BY created_at DESC \
             OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY) AS r"
        );

        let titles = QueryBuilder::new(SqlDialect::Postgres)
            .table("titles")
            .cols(["id"])
            .order_by("id");
        let q = QueryBuilder::new(SqlDialect::Postgres)
            .table("users")
            .where_in_sub("title_id", titles);
        assert_eq!(
            q.generate_select().unwrap().sql,
            "SELECT * FROM users WHERE title_id IN (SELECT id FROM titles ORDER BY id ASC)"
        );
    }

    #[test]
    fn test_weighted_column_is_projected_and_ordered_first() {
        let q = QueryBuilder::new(SqlDialect::MySql)
            .table("people")
            .cols(["id"])
            .weighted_where("first_name", QueryOperator::Equal, "ann", 3.0, 0.0, true)
            .weighted_where("city", QueryOperator::Equal, "Oslo", 1.0, 0.0, true)
            .order_by("id");
        let stmt = q.generate_select().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, (IF(first_name = ?, 3, 0) + IF(city = ?, 1, 0)) AS __weight FROM people \
             ORDER BY __weight DESC, id ASC"
        );
        assert_eq!(stmt.sql.matches("__weight DESC").count(), 1);
    }

    #[test]
    fn test_sub_weighted_where_nests_else_branch() {
        let nested = WeightedCondition::new("b", QueryOperator::Equal, 2, true, 1.0, 0);
        let q = QueryBuilder::new(SqlDialect::MsSql)
            .table("t")
            .sub_weighted_where("a", QueryOperator::Equal, 1, 2.0, nested, true);
        let stmt = q.generate_select().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT *, CASE WHEN a = @param1 THEN 2 ELSE CASE WHEN b = @param2 THEN 1 ELSE 0 END END AS __weight \
             FROM t ORDER BY __weight DESC"
        );
    }

    #[test]
    fn test_count_drops_order_without_paging() {
        let q = QueryBuilder::new(SqlDialect::MsSql)
            .table("users")
            .where_eq("active", 1)
            .order_by("email");
        let stmt = q.generate_count().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS total FROM (SELECT * FROM users WHERE active = @param1) AS count_sql"
        );
    }

    #[test]
    fn test_multi_row_insert_with_returning() {
        let q = QueryBuilder::new(SqlDialect::Postgres)
            .table("users")
            .insert(
                vec![
                    record(json!({"email": "a@b.com", "order": 1})),
                    record(json!({"email": "c@d.com"})),
                ],
                true,
            )
            .returning("id");
        let stmt = q.generate_insert().unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (email, \"order\") VALUES ($1, $2), ($3, DEFAULT) RETURNING id"
        );
        assert_eq!(stmt.param_count(), 3);
        assert_eq!(stmt.returning.as_deref(), Some("id"));
    }

    #[test]
    fn test_mssql_insert_outputs_inserted_key() {
        let q = QueryBuilder::new(SqlDialect::MsSql)
            .table("users")
            .insert(record(json!({"email": "a@b.com"})), true)
            .returning("id");
        assert_eq!(
            q.generate_insert().unwrap().sql,
            "INSERT INTO users (email) OUTPUT INSERTED.id VALUES (@param1)"
        );
    }

    #[test]
    fn test_unescaped_update_inlines_expressions() {
        let q = QueryBuilder::new(SqlDialect::MySql)
            .table("counters")
            .update(record(json!({"hits": "hits + 1", "flag": true})), false)
            .where_eq("id", 4);
        let stmt = q.generate_update().unwrap();
        assert_eq!(stmt.sql, "UPDATE counters SET hits = hits + 1, flag = 1 WHERE id = ?");
        assert_eq!(stmt.params, vec![DatabaseValue::Int32(4)]);
    }

    #[test]
    fn test_save_without_payload_is_usage_error() {
        let q = QueryBuilder::new(SqlDialect::MySql).table("users");
        assert!(matches!(q.generate_save(), Err(ModelError::Usage(_))));
    }

    #[test]
    fn test_delete_uses_predicate() {
        let q = QueryBuilder::new(SqlDialect::MsSql).table("users").where_eq("id", 9);
        assert_eq!(q.generate_delete().unwrap().sql, "DELETE FROM users WHERE id = @param1");
    }
}
