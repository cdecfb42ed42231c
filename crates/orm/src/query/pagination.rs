//! Query Builder pagination operations

use super::builder::QueryBuilder;
use super::types::Pagination;
use crate::error::ModelResult;

impl QueryBuilder {
    /// Restrict the query to one page (1-based) without counting
    pub fn for_page(mut self, per_page: u64, page: u64) -> Self {
        let page = page.max(1);
        self.limit_count = Some(per_page);
        self.offset_value = Some((page - 1) * per_page);
        self
    }

    /// Count the full result, then restrict this query to the requested page.
    ///
    /// The count runs before limit and offset are applied, so `total_rows`
    /// covers every matching row.
    pub async fn paginate(&mut self, per_page: u64, page: u64) -> ModelResult<Pagination> {
        let page = page.max(1);
        let total_rows = self.count().await?;
        self.limit_count = Some(per_page);
        self.offset_value = Some((page - 1) * per_page);
        Ok(Pagination::new(total_rows, per_page, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlDialect;

    #[test]
    fn test_for_page_computes_offset() {
        let q = QueryBuilder::new(SqlDialect::MySql).table("users").for_page(25, 3);
        assert_eq!(q.generate_select().unwrap().sql, "SELECT * FROM users LIMIT 25 OFFSET 50");
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let q = QueryBuilder::new(SqlDialect::Postgres).table("users").for_page(10, 0);
        assert_eq!(q.generate_select().unwrap().sql, "SELECT * FROM users LIMIT 10 OFFSET 0");
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(Pagination::new(101, 25, 1).total_pages, 5);
        assert_eq!(Pagination::new(0, 25, 1).total_pages, 0);
    }
}
