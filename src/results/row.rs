use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OrmError, Result};
use crate::types::{FromValue, RowValues};

/// A row from a database query result
///
/// Column names and the name-to-index map are shared by every row of the
/// result set that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a new database row, building its own column lookup table.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            rows,
            column_index_cache: cache,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }

        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    /// Decode the named column.
    ///
    /// # Errors
    /// `OrmError::Decode` when the column is missing or holds another type.
    pub fn try_get<T: FromValue>(&self, column_name: &str) -> Result<T> {
        let value = self
            .get(column_name)
            .ok_or_else(|| OrmError::Decode(format!("column {column_name} is not in the row")))?;
        T::from_value(value)
            .ok_or_else(|| OrmError::Decode(format!("column {column_name}: unexpected value {value:?}")))
    }

    /// Consume the row, keeping only its values in column order.
    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.rows
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
