//! Eager-load requests: ordered relation paths with optional query constraints

use std::fmt;
use std::sync::Arc;

use crate::query::QueryBuilder;

/// Adjusts the related query of a relation before it is batched
pub type Customizer = Arc<dyn Fn(QueryBuilder) -> QueryBuilder + Send + Sync>;

/// Ordered mapping of dotted relation path to an optional customizer.
///
/// Paths are loaded one after another in insertion order. A customizer
/// applies to the last segment of its path.
#[derive(Clone, Default)]
pub struct EagerLoad {
    paths: Vec<(String, Option<Customizer>)>,
}

impl EagerLoad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` as is
    pub fn with(mut self, path: &str) -> Self {
        self.paths.push((path.to_string(), None));
        self
    }

    /// Load `path`, letting `customizer` filter or trim the related query
    pub fn with_constraint<F>(mut self, path: &str, customizer: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.paths.push((path.to_string(), Some(Arc::new(customizer))));
        self
    }

    pub fn paths(&self) -> &[(String, Option<Customizer>)] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl From<&str> for EagerLoad {
    fn from(path: &str) -> Self {
        EagerLoad::new().with(path)
    }
}

impl From<Vec<&str>> for EagerLoad {
    fn from(paths: Vec<&str>) -> Self {
        paths.into_iter().fold(EagerLoad::new(), EagerLoad::with)
    }
}

impl fmt::Debug for EagerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.paths
                    .iter()
                    .map(|(path, customizer)| (path, customizer.is_some())),
            )
            .finish()
    }
}
