//! BelongsTo - the parent row holds the foreign key
//!
//! Batched through the parent table so rows stay keyed on parent primary keys:
//! `SELECT related.*, __parent.pk AS key FROM related
//!  INNER JOIN parent AS __parent ON __parent.fk = related.pk
//!  WHERE __parent.pk IN (...)`

use serde_json::Value as JsonValue;

use crate::model::ModelSchema;
use crate::query::QueryBuilder;

const PARENT_ALIAS: &str = "__parent";

pub(crate) fn scope(
    query: QueryBuilder,
    parent: &ModelSchema,
    related: &ModelSchema,
    foreign_key: &str,
    parent_ids: &[JsonValue],
    key: &str,
) -> QueryBuilder {
    let parent_pk = format!("{}.{}", PARENT_ALIAS, parent.primary_key());
    query
        .join(
            format!("{} AS {}", parent.table(), PARENT_ALIAS),
            &format!("{}.{}", PARENT_ALIAS, foreign_key),
            &format!("{}.{}", related.table(), related.primary_key()),
        )
        .where_in(&parent_pk, parent_ids.to_vec(), true)
        .add_col(&format!("{} AS {}", parent_pk, key))
}
