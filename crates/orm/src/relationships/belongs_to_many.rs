//! BelongsToMany - related rows reached through a link table
//!
//! `SELECT related.*, link.extra..., link.left AS key FROM related
//!  INNER JOIN link ON link.right = related.pk WHERE link.left IN (...)`
//!
//! Link rows themselves are maintained with [`Relation::link`],
//! [`Relation::unlink`] and [`Relation::update_link`].

use serde_json::Value as JsonValue;

use super::{key_string, Relation, RelationKind};
use crate::backends::{ExecResult, Record};
use crate::error::{ModelError, ModelResult};
use crate::model::ModelSchema;
use crate::query::QueryBuilder;

#[allow(clippy::too_many_arguments)]
pub(crate) fn scope(
    query: QueryBuilder,
    related: &ModelSchema,
    link_table: &str,
    left_key: &str,
    right_key: &str,
    extra_columns: &[String],
    parent_ids: &[JsonValue],
    key: &str,
) -> QueryBuilder {
    let left = format!("{}.{}", link_table, left_key);
    let mut query = query.join(
        link_table,
        &format!("{}.{}", link_table, right_key),
        &format!("{}.{}", related.table(), related.primary_key()),
    );
    for extra in extra_columns {
        query = query.add_col(&format!("{}.{}", link_table, extra));
    }
    query
        .where_in(&left, parent_ids.to_vec(), true)
        .add_col(&format!("{} AS {}", left, key))
}

impl Relation {
    /// Insert a link row pairing the bound record with `related_id`
    pub async fn link(&self, related_id: impl Into<JsonValue>, extra: Record) -> ModelResult<ExecResult> {
        let (link_table, left_key, right_key) = self.link_keys()?;
        let mut row = Record::new();
        row.insert(left_key.to_string(), self.bound_id()?);
        row.insert(right_key.to_string(), related_id.into());
        for (column, value) in extra {
            row.insert(column, value);
        }

        tracing::debug!(
            "Linking {}({}) through {}",
            self.parent().table(),
            key_string(self.parent_id()),
            link_table
        );
        self.link_query(link_table)?.insert(row, true).save().await
    }

    /// Delete the link row pairing the bound record with `related_id`
    pub async fn unlink(&self, related_id: impl Into<JsonValue>) -> ModelResult<ExecResult> {
        let (link_table, left_key, right_key) = self.link_keys()?;
        self.link_query(link_table)?
            .where_eq(left_key, self.bound_id()?)
            .where_eq(right_key, related_id.into())
            .delete()
            .await
    }

    /// Update the extra columns of the link row pairing the bound record with `related_id`
    pub async fn update_link(&self, related_id: impl Into<JsonValue>, values: Record) -> ModelResult<ExecResult> {
        let (link_table, left_key, right_key) = self.link_keys()?;
        if values.is_empty() {
            return Err(ModelError::Usage("no link columns to update".to_string()));
        }
        self.link_query(link_table)?
            .where_eq(left_key, self.bound_id()?)
            .where_eq(right_key, related_id.into())
            .update(values, true)
            .save()
            .await
    }

    fn link_keys(&self) -> ModelResult<(&str, &str, &str)> {
        match self.kind() {
            RelationKind::BelongsToMany {
                link_table,
                left_key,
                right_key,
                ..
            } => Ok((link_table, left_key, right_key)),
            other => Err(ModelError::Usage(format!(
                "link rows only exist for many-to-many relations, not {:?}",
                other
            ))),
        }
    }

    fn bound_id(&self) -> ModelResult<JsonValue> {
        if self.parent_id().is_null() {
            return Err(ModelError::Usage(format!(
                "{} record must be saved before it can be linked",
                self.parent().table()
            )));
        }
        Ok(self.parent_id().clone())
    }

    /// Link tables live alongside the parent table
    fn link_query(&self, link_table: &str) -> ModelResult<QueryBuilder> {
        Ok(self.db.query(self.parent().data_source())?.table(link_table))
    }
}
