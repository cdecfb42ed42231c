//! HasOne / HasMany - the related row holds the foreign key
//!
//! `SELECT related.*, related.fk AS key FROM related WHERE related.fk IN (...)`

use serde_json::Value as JsonValue;

use crate::model::ModelSchema;
use crate::query::QueryBuilder;

pub(crate) fn scope(
    query: QueryBuilder,
    related: &ModelSchema,
    foreign_key: &str,
    parent_ids: &[JsonValue],
    key: &str,
) -> QueryBuilder {
    let foreign = format!("{}.{}", related.table(), foreign_key);
    query
        .where_in(&foreign, parent_ids.to_vec(), true)
        .add_col(&format!("{} AS {}", foreign, key))
}
