//! Relationships Module - relation resolvers for active-record models
//!
//! A [`Relation`] is bound to one parent record but always resolves through
//! a batched query keyed on parent primary keys. Every row it returns carries
//! a synthetic `__table_<parent table>__key` column naming the parent that
//! owns it, which is stripped before the row is hydrated.

pub mod belongs_to;
pub mod belongs_to_many;
pub mod has_many;

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{Customizer, LoadedRelation, ModelCollection, ModelRecord, ModelSchema};
use crate::query::QueryBuilder;

/// How the related table is reached from the parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Parent table holds `foreign_key` referencing the related primary key
    BelongsTo { foreign_key: String },
    /// Related table holds `foreign_key` referencing the parent primary key; at most one row
    HasOne { foreign_key: String },
    /// Related table holds `foreign_key` referencing the parent primary key
    HasMany { foreign_key: String },
    /// Rows of `link_table` pair `left_key` (parent) with `right_key` (related)
    BelongsToMany {
        link_table: String,
        left_key: String,
        right_key: String,
        extra_columns: Vec<String>,
    },
}

impl RelationKind {
    pub fn is_single(&self) -> bool {
        matches!(self, RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Relation {
    db: Database,
    parent: &'static ModelSchema,
    related: &'static ModelSchema,
    kind: RelationKind,
    parent_id: JsonValue,
}

impl Relation {
    pub(crate) fn new(
        db: Database,
        parent: &'static ModelSchema,
        related: &'static ModelSchema,
        kind: RelationKind,
        parent_id: JsonValue,
    ) -> Self {
        Self {
            db,
            parent,
            related,
            kind,
            parent_id,
        }
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn parent(&self) -> &'static ModelSchema {
        self.parent
    }

    pub fn related(&self) -> &'static ModelSchema {
        self.related
    }

    /// Primary key of the record this relation was built from
    pub fn parent_id(&self) -> &JsonValue {
        &self.parent_id
    }

    pub fn is_single(&self) -> bool {
        self.kind.is_single()
    }

    pub fn synthetic_key(&self) -> String {
        synthetic_key(self.parent.table())
    }

    /// Plain query over the related table, before any batching
    pub fn base_query(&self) -> ModelResult<QueryBuilder> {
        Ok(self.db.query(self.related.data_source())?.table(self.related.table()))
    }

    /// Query returning related rows for every parent in `parent_ids`
    pub fn batch_query(
        &self,
        parent_ids: &[JsonValue],
        customizer: Option<&Customizer>,
    ) -> ModelResult<QueryBuilder> {
        let mut query = self.base_query()?;
        if let Some(customize) = customizer {
            query = customize(query).group_conditions();
        }
        let query = qualify_columns(query, self.related.table());
        let key = self.synthetic_key();

        Ok(match &self.kind {
            RelationKind::BelongsTo { foreign_key } => {
                belongs_to::scope(query, self.parent, self.related, foreign_key, parent_ids, &key)
            }
            RelationKind::HasOne { foreign_key } | RelationKind::HasMany { foreign_key } => {
                has_many::scope(query, self.related, foreign_key, parent_ids, &key)
            }
            RelationKind::BelongsToMany {
                link_table,
                left_key,
                right_key,
                extra_columns,
            } => belongs_to_many::scope(
                query,
                self.related,
                link_table,
                left_key,
                right_key,
                extra_columns,
                parent_ids,
                &key,
            ),
        })
    }

    /// Related models for many parents in one statement, grouped by parent key
    pub async fn get_results_batched(
        &self,
        parent_ids: &[JsonValue],
        customizer: Option<&Customizer>,
    ) -> ModelResult<HashMap<String, ModelCollection>> {
        let mut grouped: HashMap<String, ModelCollection> = HashMap::new();
        if parent_ids.is_empty() {
            return Ok(grouped);
        }

        let query = self.batch_query(parent_ids, customizer)?;
        let key = self.synthetic_key();
        for mut row in query.fetch().await? {
            let owner = row.remove(&key).ok_or_else(|| {
                ModelError::Relationship(format!("related row is missing the '{}' column", key))
            })?;
            let model = ModelRecord::from_row(self.db.clone(), self.related, row, query.additional_columns());
            grouped.entry(key_string(&owner)).or_default().push(model);
        }
        Ok(grouped)
    }

    /// Related models of the bound record
    pub async fn get_results(&self) -> ModelResult<ModelCollection> {
        if self.parent_id.is_null() {
            return Ok(ModelCollection::new());
        }
        let mut grouped = self
            .get_results_batched(std::slice::from_ref(&self.parent_id), None)
            .await?;
        Ok(grouped.remove(&key_string(&self.parent_id)).unwrap_or_default())
    }

    /// The single related model of the bound record; none is a `NotFound` error
    pub async fn get_result(&self) -> ModelResult<ModelRecord> {
        self.get_results()
            .await?
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| {
                ModelError::NotFound(format!(
                    "{} related to {}({})",
                    self.related.table(),
                    self.parent.table(),
                    key_string(&self.parent_id)
                ))
            })
    }

    /// Resolve for the bound record in the shape the relation kind implies
    pub async fn load(&self) -> ModelResult<LoadedRelation> {
        let results = self.get_results().await?;
        Ok(if self.is_single() {
            LoadedRelation::One(results.into_vec().into_iter().next().map(Box::new))
        } else {
            LoadedRelation::Many(results)
        })
    }
}

/// Name of the column identifying the owning parent of a related row
pub fn synthetic_key(parent_table: &str) -> String {
    format!("__table_{}__key", parent_table)
}

/// Canonical text form of a key value, used for grouping and indexing
pub(crate) fn key_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Prefix bare column names with the related table so joins stay unambiguous
fn qualify_columns(mut query: QueryBuilder, table: &str) -> QueryBuilder {
    if query.columns.is_empty() {
        query.columns.push(format!("{}.*", table));
        return query;
    }
    for column in query.columns.iter_mut() {
        let bare = column == "*"
            || column
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if bare {
            *column = format!("{}.{}", table, column);
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_string_normalizes_numbers_and_strings() {
        assert_eq!(key_string(&json!(12)), "12");
        assert_eq!(key_string(&json!("12")), "12");
        assert_eq!(key_string(&JsonValue::Null), "null");
    }

    #[test]
    fn test_synthetic_key_names_parent_table() {
        assert_eq!(synthetic_key("users"), "__table_users__key");
    }

    #[test]
    fn test_single_kinds() {
        assert!(RelationKind::BelongsTo { foreign_key: "city_id".into() }.is_single());
        assert!(RelationKind::HasOne { foreign_key: "user_id".into() }.is_single());
        assert!(!RelationKind::HasMany { foreign_key: "user_id".into() }.is_single());
    }
}
