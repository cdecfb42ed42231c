//! Model System - active-record models over declared schemas
//!
//! - `schema`: per-model-type declaration (table, key, columns, relation map)
//! - `record`: one row with dirty tracking, persistence and serialization
//! - `collection`: indexed model sets and the batched eager-loading engine
//! - `eager`: eager-load requests

pub mod collection;
pub mod eager;
pub mod record;
pub mod schema;

pub use collection::ModelCollection;
pub use eager::{Customizer, EagerLoad};
pub use record::{LoadedRelation, ModelRecord};
pub use schema::{ModelSchema, RelationFactory};
