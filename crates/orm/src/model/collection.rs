//! Model collections and the batched eager-loading engine

use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

use super::eager::{Customizer, EagerLoad};
use super::record::{LoadedRelation, ModelRecord};
use crate::error::ModelResult;
use crate::relationships::key_string;

/// Ordered models plus a primary-key index (first occurrence wins)
#[derive(Debug, Clone, Default)]
pub struct ModelCollection {
    models: Vec<ModelRecord>,
    index: HashMap<String, usize>,
}

impl ModelCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, model: ModelRecord) {
        let key = key_string(model.primary_key_value());
        let position = self.models.len();
        self.index.entry(key).or_insert(position);
        self.models.push(model);
    }

    /// Model by primary key
    pub fn get(&self, key: &JsonValue) -> Option<&ModelRecord> {
        self.index.get(&key_string(key)).map(|&i| &self.models[i])
    }

    pub fn get_mut(&mut self, key: &JsonValue) -> Option<&mut ModelRecord> {
        match self.index.get(&key_string(key)) {
            Some(&i) => self.models.get_mut(i),
            None => None,
        }
    }

    pub fn first(&self) -> Option<&ModelRecord> {
        self.models.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelRecord> {
        self.models.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ModelRecord> {
        self.models.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Distinct primary keys in collection order
    pub fn keys(&self) -> Vec<JsonValue> {
        let mut seen = HashSet::new();
        self.models
            .iter()
            .map(|m| m.primary_key_value())
            .filter(|key| seen.insert(key_string(key)))
            .cloned()
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.models.iter().map(ModelRecord::to_json).collect())
    }

    pub fn into_vec(self) -> Vec<ModelRecord> {
        self.models
    }

    /// Load every path in order, one batched statement per path level
    pub async fn eager_load(&mut self, paths: impl Into<EagerLoad>) -> ModelResult<()> {
        let paths = paths.into();
        for (path, customizer) in paths.paths() {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            self.load_path(&segments, customizer.as_ref()).await?;
        }
        Ok(())
    }

    fn load_path<'a>(
        &'a mut self,
        segments: &'a [String],
        customizer: Option<&'a Customizer>,
    ) -> BoxFuture<'a, ModelResult<()>> {
        Box::pin(async move {
            let (name, rest) = match segments.split_first() {
                Some(split) => split,
                None => return Ok(()),
            };
            let relation = match self.models.first() {
                Some(model) => model.relation(name)?,
                None => return Ok(()),
            };

            let mut seen = HashSet::new();
            let pending: Vec<JsonValue> = self
                .models
                .iter()
                .filter(|m| !m.is_loaded(name))
                .map(|m| m.primary_key_value())
                .filter(|key| !key.is_null() && seen.insert(key_string(key)))
                .cloned()
                .collect();

            if !pending.is_empty() {
                tracing::debug!(
                    "Eager loading '{}' on {} for {} parents",
                    name,
                    relation.parent().table(),
                    pending.len()
                );
                let own_customizer = if rest.is_empty() { customizer } else { None };
                let grouped = relation.get_results_batched(&pending, own_customizer).await?;

                for model in self.models.iter_mut().filter(|m| !m.is_loaded(name)) {
                    let group = grouped.get(&key_string(model.primary_key_value())).cloned();
                    let loaded = if relation.is_single() {
                        LoadedRelation::One(group.and_then(|c| c.into_vec().into_iter().next()).map(Box::new))
                    } else {
                        LoadedRelation::Many(group.unwrap_or_default())
                    };
                    model.set_loaded(name, loaded);
                }
            }

            if !rest.is_empty() {
                self.load_nested(name, rest, customizer).await?;
            }
            Ok(())
        })
    }

    /// Continue a path below `name` on every related model, then put them back
    async fn load_nested(
        &mut self,
        name: &str,
        rest: &[String],
        customizer: Option<&Customizer>,
    ) -> ModelResult<()> {
        enum Shape {
            Missing,
            One(bool),
            Many(usize),
        }

        let mut shapes = Vec::with_capacity(self.models.len());
        let mut related = ModelCollection::new();
        for model in &mut self.models {
            match model.take_loaded(name) {
                Some(LoadedRelation::One(Some(one))) => {
                    related.push(*one);
                    shapes.push(Shape::One(true));
                }
                Some(LoadedRelation::One(None)) => shapes.push(Shape::One(false)),
                Some(LoadedRelation::Many(many)) => {
                    shapes.push(Shape::Many(many.len()));
                    for child in many.into_vec() {
                        related.push(child);
                    }
                }
                None => shapes.push(Shape::Missing),
            }
        }

        related.load_path(rest, customizer).await?;

        let mut children = related.into_vec().into_iter();
        for (model, shape) in self.models.iter_mut().zip(shapes) {
            match shape {
                Shape::Missing => {}
                Shape::One(false) => model.set_loaded(name, LoadedRelation::One(None)),
                Shape::One(true) => {
                    let one = children.next().map(Box::new);
                    model.set_loaded(name, LoadedRelation::One(one));
                }
                Shape::Many(count) => {
                    let many: ModelCollection = children.by_ref().take(count).collect();
                    model.set_loaded(name, LoadedRelation::Many(many));
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<ModelRecord>> for ModelCollection {
    fn from(models: Vec<ModelRecord>) -> Self {
        models.into_iter().collect()
    }
}

impl FromIterator<ModelRecord> for ModelCollection {
    fn from_iter<I: IntoIterator<Item = ModelRecord>>(iter: I) -> Self {
        let mut collection = ModelCollection::new();
        for model in iter {
            collection.push(model);
        }
        collection
    }
}

impl IntoIterator for ModelCollection {
    type Item = ModelRecord;
    type IntoIter = std::vec::IntoIter<ModelRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.into_iter()
    }
}

impl<'a> IntoIterator for &'a ModelCollection {
    type Item = &'a ModelRecord;
    type IntoIter = std::slice::Iter<'a, ModelRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}
