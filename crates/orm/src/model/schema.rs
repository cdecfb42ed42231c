//! Model schema declarations
//!
//! A schema is declared once per model type, typically in a `static`
//! initialized with `once_cell::sync::Lazy`, and referenced as
//! `&'static ModelSchema` by every record of that type:
//!
//! ```ignore
//! static CITY: Lazy<ModelSchema> = Lazy::new(|| {
//!     ModelSchema::new("main", "cities")
//!         .with_columns(["id", "name"])
//!         .with_relation("users", |city| city.has_many(&USER, "city_id"))
//! });
//! ```

use std::fmt;

use super::record::ModelRecord;
use crate::relationships::Relation;

/// Builds a relation bound to one record
pub type RelationFactory = fn(&ModelRecord) -> Relation;

pub struct ModelSchema {
    data_source: String,
    table: String,
    primary_key: String,
    columns: Vec<String>,
    relations: Vec<(String, RelationFactory)>,
}

impl ModelSchema {
    /// Schema for `table` on `data_source`, with primary key `id`
    pub fn new(data_source: &str, table: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            table: table.to_string(),
            primary_key: "id".to_string(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }

    /// Declare the persisted columns; the primary key is added if missing
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        if !self.columns.contains(&self.primary_key) {
            self.columns.insert(0, self.primary_key.clone());
        }
        self
    }

    /// Register a relation under `name`
    pub fn with_relation(mut self, name: &str, factory: RelationFactory) -> Self {
        self.relations.retain(|(existing, _)| existing != name);
        self.relations.push((name.to_string(), factory));
        self
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn relation_factory(&self, name: &str) -> Option<RelationFactory> {
        self.relations
            .iter()
            .find(|(relation, _)| relation == name)
            .map(|(_, factory)| *factory)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("data_source", &self.data_source)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("relations", &self.relation_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_is_always_declared() {
        let schema = ModelSchema::new("main", "tags")
            .with_primary_key("tag_id")
            .with_columns(["label"]);
        assert_eq!(schema.columns(), &["tag_id".to_string(), "label".to_string()]);
        assert!(schema.has_column("tag_id"));
        assert!(!schema.has_column("id"));
    }

    #[test]
    fn test_unknown_relation_has_no_factory() {
        let schema = ModelSchema::new("main", "tags").with_columns(["id"]);
        assert!(schema.relation_factory("owner").is_none());
    }
}
