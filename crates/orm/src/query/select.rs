//! Query Builder column projection

use super::builder::QueryBuilder;

impl QueryBuilder {
    /// Replace the projection
    pub fn cols<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Project one more column and remember it as an additional (non-persisted) column.
    ///
    /// Appending to the default projection keeps `*` in front.
    pub fn add_col(mut self, column: &str) -> Self {
        if self.columns.is_empty() {
            self.columns.push("*".to_string());
        }
        self.columns.push(column.to_string());
        let key = result_key(column);
        if !self.additional_columns.contains(&key) {
            self.additional_columns.push(key);
        }
        self
    }

    pub fn remove_col(self, column: &str) -> Self {
        self.remove_cols(&[column])
    }

    pub fn remove_cols(mut self, columns: &[&str]) -> Self {
        self.columns.retain(|c| !columns.contains(&c.as_str()));
        self.additional_columns
            .retain(|key| !columns.iter().any(|c| result_key(c) == *key));
        self
    }

    /// Keep only the listed columns of the current projection
    pub fn keep_cols(mut self, columns: &[&str]) -> Self {
        self.columns.retain(|c| columns.contains(&c.as_str()));
        let kept: Vec<String> = self.columns.iter().map(|c| result_key(c)).collect();
        self.additional_columns.retain(|key| kept.contains(key));
        self
    }

    /// Emit SELECT DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// Key under which a projected column shows up in a result row
pub(crate) fn result_key(column: &str) -> String {
    let parts: Vec<&str> = column.split_whitespace().collect();
    let reference = match parts.as_slice() {
        [_, keyword, alias] if keyword.eq_ignore_ascii_case("as") => *alias,
        _ => column.trim(),
    };
    reference
        .rsplit('.')
        .next()
        .unwrap_or(reference)
        .trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'))
        .to_string()
}
