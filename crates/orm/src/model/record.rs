//! Active-record model instances
//!
//! A [`ModelRecord`] keeps persisted values (`original`) apart from pending
//! ones (`changed`). Reads see `changed` first; a successful `save` merges
//! `changed` into `original`. Columns outside the schema are never persisted:
//! they are either ignored or, when projected with `add_col`, kept as
//! additional columns for serialization only.

use serde_json::Value as JsonValue;

use super::collection::ModelCollection;
use super::eager::EagerLoad;
use super::schema::ModelSchema;
use crate::backends::Record;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::relationships::{key_string, Relation, RelationKind};

static NULL: JsonValue = JsonValue::Null;

/// A relation attached to a record
#[derive(Debug, Clone)]
pub enum LoadedRelation {
    /// BelongsTo / HasOne; `None` when no related row exists
    One(Option<Box<ModelRecord>>),
    /// HasMany / BelongsToMany
    Many(ModelCollection),
}

impl LoadedRelation {
    pub fn to_json(&self) -> JsonValue {
        match self {
            LoadedRelation::One(Some(model)) => model.to_json(),
            LoadedRelation::One(None) => JsonValue::Null,
            LoadedRelation::Many(collection) => collection.to_json(),
        }
    }

    pub fn as_one(&self) -> Option<&ModelRecord> {
        match self {
            LoadedRelation::One(model) => model.as_deref(),
            LoadedRelation::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&ModelCollection> {
        match self {
            LoadedRelation::Many(collection) => Some(collection),
            LoadedRelation::One(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRecord {
    db: Database,
    schema: &'static ModelSchema,
    original: Record,
    changed: Record,
    additional: Record,
    visible: Option<Vec<String>>,
    relations: Vec<(String, LoadedRelation)>,
    is_new: bool,
}

impl ModelRecord {
    /// Unsaved record with every declared column set to null
    pub fn new(db: Database, schema: &'static ModelSchema) -> Self {
        let original = schema
            .columns()
            .iter()
            .map(|column| (column.clone(), JsonValue::Null))
            .collect();
        Self {
            db,
            schema,
            original,
            changed: Record::new(),
            additional: Record::new(),
            visible: None,
            relations: Vec::new(),
            is_new: true,
        }
    }

    /// Hydrate a fetched row; `additional` names projected non-schema columns to keep
    pub fn from_row(db: Database, schema: &'static ModelSchema, row: Record, additional: &[String]) -> Self {
        let mut model = Self::new(db, schema);
        model.visible = Some(row.keys().cloned().collect());
        for key in additional {
            if let Some(value) = row.get(key) {
                model.additional.insert(key.clone(), value.clone());
            }
        }
        model.load_data(row);
        model
    }

    /// Load a record by primary key; no row is a `NotFound` error
    pub async fn find(db: &Database, schema: &'static ModelSchema, id: impl Into<JsonValue>) -> ModelResult<Self> {
        let id = id.into();
        let models = db
            .query(schema.data_source())?
            .table(schema.table())
            .where_eq(schema.primary_key(), &id)
            .fetch_models(schema)
            .await?;
        models
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::NotFound(format!("{}({})", schema.table(), key_string(&id))))
    }

    /// Copy declared columns of `row` into the persisted state
    pub fn load_data(&mut self, row: Record) {
        for (column, value) in row {
            if self.schema.has_column(&column) {
                self.original.insert(column, value);
            }
        }
        self.is_new = false;
    }

    /// Stage a value for a declared column; other columns are ignored
    pub fn update_column(&mut self, column: &str, value: impl Into<JsonValue>) -> &mut Self {
        if self.schema.has_column(column) {
            self.changed.insert(column.to_string(), value.into());
        }
        self
    }

    pub fn update_columns(&mut self, values: Record) -> &mut Self {
        for (column, value) in values {
            self.update_column(&column, value);
        }
        self
    }

    /// Current value of a declared column, pending changes first
    pub fn get_column(&self, column: &str) -> &JsonValue {
        self.changed
            .get(column)
            .or_else(|| self.original.get(column))
            .unwrap_or(&NULL)
    }

    /// Value of a join-only column projected with `add_col`
    pub fn get_additional(&self, column: &str) -> Option<&JsonValue> {
        self.additional.get(column)
    }

    pub fn primary_key_value(&self) -> &JsonValue {
        self.get_column(self.schema.primary_key())
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn changed_columns(&self) -> Vec<&str> {
        self.changed.keys().map(String::as_str).collect()
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Restrict serialization to these columns (relations are always emitted)
    pub fn set_visible<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn clear_visible(&mut self) -> &mut Self {
        self.visible = None;
        self
    }

    /// Persist pending changes: INSERT for new records, UPDATE by primary key otherwise.
    ///
    /// Returns whether a row was affected; with nothing pending no statement is sent.
    pub async fn save(&mut self) -> ModelResult<bool> {
        if self.changed.is_empty() {
            return Ok(false);
        }
        let pk = self.schema.primary_key();
        let query = self.db.query(self.schema.data_source())?.table(self.schema.table());

        let result = if self.is_new {
            let result = query.insert(self.changed.clone(), true).returning(pk).save().await?;
            if !self.changed.contains_key(pk) {
                if let Some(id) = &result.insert_id {
                    self.original.insert(pk.to_string(), id.clone());
                }
            }
            result
        } else {
            let id = self.original.get(pk).cloned().unwrap_or(JsonValue::Null);
            if id.is_null() {
                return Err(ModelError::Usage(format!(
                    "cannot update {} without a primary key value",
                    self.schema.table()
                )));
            }
            query
                .update(self.changed.clone(), true)
                .where_eq(pk, id)
                .save()
                .await?
        };

        for (column, value) in std::mem::take(&mut self.changed) {
            self.original.insert(column, value);
        }
        self.is_new = false;
        Ok(result.rows_affected > 0)
    }

    /// Delete this record's row; unsaved records cannot be deleted
    pub async fn delete(&self) -> ModelResult<bool> {
        if self.is_new {
            return Err(ModelError::Usage(format!(
                "cannot delete an unsaved {} record",
                self.schema.table()
            )));
        }
        let pk = self.schema.primary_key();
        let id = self.original.get(pk).cloned().unwrap_or(JsonValue::Null);
        let result = self
            .db
            .query(self.schema.data_source())?
            .table(self.schema.table())
            .where_eq(pk, id)
            .delete()
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Column snapshot plus additional columns, filtered by the visible set, plus loaded relations
    pub fn to_json(&self) -> JsonValue {
        let is_visible = |column: &str| {
            self.visible
                .as_ref()
                .map_or(true, |visible| visible.iter().any(|v| v == column))
        };

        let mut out = Record::new();
        for column in self.schema.columns() {
            if is_visible(column) {
                out.insert(column.clone(), self.get_column(column).clone());
            }
        }
        for (column, value) in &self.additional {
            if is_visible(column) {
                out.insert(column.clone(), value.clone());
            }
        }
        for (name, relation) in &self.relations {
            out.insert(name.clone(), relation.to_json());
        }
        JsonValue::Object(out)
    }

    /// Build the relation registered on the schema under `name`
    pub fn relation(&self, name: &str) -> ModelResult<Relation> {
        self.schema
            .relation_factory(name)
            .map(|factory| factory(self))
            .ok_or_else(|| {
                ModelError::Relationship(format!(
                    "{} has no relation named '{}'",
                    self.schema.table(),
                    name
                ))
            })
    }

    /// Loaded relation by name, if any
    pub fn loaded(&self, name: &str) -> Option<&LoadedRelation> {
        self.relations
            .iter()
            .find(|(relation, _)| relation == name)
            .map(|(_, loaded)| loaded)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded(name).is_some()
    }

    pub(crate) fn set_loaded(&mut self, name: &str, loaded: LoadedRelation) {
        match self.relations.iter_mut().find(|(relation, _)| relation == name) {
            Some((_, slot)) => *slot = loaded,
            None => self.relations.push((name.to_string(), loaded)),
        }
    }

    pub(crate) fn take_loaded(&mut self, name: &str) -> Option<LoadedRelation> {
        let position = self.relations.iter().position(|(relation, _)| relation == name)?;
        Some(self.relations.remove(position).1)
    }

    /// Fetch one relation for this record only and cache it
    pub async fn load_relation(&mut self, name: &str) -> ModelResult<&LoadedRelation> {
        let loaded = self.relation(name)?.load().await?;
        self.set_loaded(name, loaded);
        self.loaded(name)
            .ok_or_else(|| ModelError::Relationship(format!("relation '{}' was not attached", name)))
    }

    /// Eager-load relation paths on this record alone
    pub async fn eager_load(&mut self, paths: impl Into<EagerLoad>) -> ModelResult<()> {
        let mut collection = ModelCollection::from(vec![self.clone()]);
        collection.eager_load(paths).await?;
        if let Some(loaded) = collection.into_vec().pop() {
            *self = loaded;
        }
        Ok(())
    }

    /// This record owns one row of `related` through `foreign_key` on its own table
    pub fn belongs_to(&self, related: &'static ModelSchema, foreign_key: &str) -> Relation {
        self.relation_of(
            related,
            RelationKind::BelongsTo {
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    /// One row of `related` points back here through `foreign_key`
    pub fn has_one(&self, related: &'static ModelSchema, foreign_key: &str) -> Relation {
        self.relation_of(
            related,
            RelationKind::HasOne {
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    /// Many rows of `related` point back here through `foreign_key`
    pub fn has_many(&self, related: &'static ModelSchema, foreign_key: &str) -> Relation {
        self.relation_of(
            related,
            RelationKind::HasMany {
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    /// Rows of `related` reached through `link_table`, where `left_key` references
    /// this record and `right_key` the related one; `extra_columns` of the link
    /// row are surfaced as additional columns
    pub fn belongs_to_many(
        &self,
        related: &'static ModelSchema,
        link_table: &str,
        left_key: &str,
        right_key: &str,
        extra_columns: &[&str],
    ) -> Relation {
        self.relation_of(
            related,
            RelationKind::BelongsToMany {
                link_table: link_table.to_string(),
                left_key: left_key.to_string(),
                right_key: right_key.to_string(),
                extra_columns: extra_columns.iter().map(|c| c.to_string()).collect(),
            },
        )
    }

    fn relation_of(&self, related: &'static ModelSchema, kind: RelationKind) -> Relation {
        Relation::new(
            self.db.clone(),
            self.schema,
            related,
            kind,
            self.primary_key_value().clone(),
        )
    }
}
