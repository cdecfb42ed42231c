//! Query Builder DML payloads (INSERT, UPDATE)

use super::builder::QueryBuilder;
use super::types::{InsertRows, WritePayload};
use crate::backends::{DatabaseValue, Record};

impl QueryBuilder {
    /// Stage an INSERT of one or many rows.
    ///
    /// With `escape` every value is bound as a parameter; otherwise text values
    /// are written into the statement verbatim (SQL expressions) and other
    /// values as literals.
    pub fn insert(mut self, rows: impl Into<InsertRows>, escape: bool) -> Self {
        let rows = rows
            .into()
            .into_vec()
            .into_iter()
            .map(record_to_values)
            .collect();
        self.payload = Some(WritePayload::Insert { rows, escape });
        self
    }

    /// Stage an UPDATE of the given columns, scoped by the accumulated predicate
    pub fn update(mut self, values: Record, escape: bool) -> Self {
        self.payload = Some(WritePayload::Update {
            values: record_to_values(values),
            escape,
        });
        self
    }

    /// Report the generated value of `column` from an INSERT
    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    /// Whether an INSERT or UPDATE is staged
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

fn record_to_values(record: Record) -> Vec<(String, DatabaseValue)> {
    record
        .into_iter()
        .map(|(column, value)| (column, DatabaseValue::from_json(value)))
        .collect()
}
