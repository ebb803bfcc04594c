//! Decoded rows.

use fluxwire_protocol::{Timestamp, Value, TIME_COLUMN};
use std::sync::Arc;

/// One row of a series: its values plus a shared view of the column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<[String]>,
}

impl Row {
    pub fn new(values: Vec<Value>, columns: Arc<[String]>) -> Self {
        Self { values, columns }
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range. Row arity follows the series
    /// columns, so an out-of-range index is a caller bug.
    pub fn value(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Looks a value up by column name. Returns `None` when the column is
    /// unknown or no column list was sent.
    pub fn value_by_name(&self, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.values.get(index)
    }

    /// Value of the `time` column as a timestamp, or the Unix epoch if the
    /// column is missing or not a time.
    pub fn time(&self) -> Timestamp {
        self.value_by_name(TIME_COLUMN)
            .and_then(Value::as_timestamp)
            .unwrap_or_default()
    }
}
