use std::collections::VecDeque;
use std::sync::Arc;

use super::{CustomDbRow, ResultSet};

/// Cursor-like handle over the outcome of one statement.
///
/// The connection is already back in the pool (or still held by its
/// transaction) by the time a caller sees this; rows are buffered.
#[derive(Debug, Default)]
pub struct Cursor {
    rows: VecDeque<CustomDbRow>,
    column_names: Option<Arc<Vec<String>>>,
    rowcount: usize,
    last_insert_id: Option<i64>,
}

impl Cursor {
    #[must_use]
    pub fn new(result_set: ResultSet, last_insert_id: Option<i64>) -> Self {
        let column_names = result_set.get_column_names().cloned();
        Cursor {
            rowcount: result_set.rows_affected,
            rows: result_set.results.into(),
            column_names,
            last_insert_id,
        }
    }

    /// Rows affected by a mutation, or rows produced by a query.
    #[must_use]
    pub fn rowcount(&self) -> usize {
        self.rowcount
    }

    /// Backend-assigned id of the last inserted row, where the backend reports one.
    #[must_use]
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// True when the statement produced a row description, even if zero rows.
    #[must_use]
    pub fn has_rows(&self) -> bool {
        self.column_names.is_some()
    }

    /// Rows not yet fetched.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn fetchone(&mut self) -> Option<CustomDbRow> {
        self.rows.pop_front()
    }

    pub fn fetchmany(&mut self, size: usize) -> Vec<CustomDbRow> {
        let n = size.min(self.rows.len());
        self.rows.drain(..n).collect()
    }

    pub fn fetchall(&mut self) -> Vec<CustomDbRow> {
        self.rows.drain(..).collect()
    }
}
