use std::collections::VecDeque;
use std::sync::Arc;

use super::row::FromRow;
use crate::error::Result;
use crate::results::{Cursor, CustomDbRow};

/// Rows of one executed statement, decoded on demand.
///
/// Raw rows are drained from the cursor into `pending`; each is decoded the
/// first time something asks for it or for a later row, so random access
/// only pays for the prefix it touches.
#[derive(Debug)]
pub struct RowCache<R> {
    pending: VecDeque<CustomDbRow>,
    rows: VecDeque<R>,
    rowcount: usize,
    column_names: Option<Arc<Vec<String>>>,
}

impl<R: FromRow> RowCache<R> {
    pub(crate) fn new(mut cursor: Cursor) -> Self {
        let column_names = cursor.column_names().cloned();
        let pending: VecDeque<CustomDbRow> = cursor.fetchall().into();
        Self {
            rows: VecDeque::with_capacity(pending.len()),
            rowcount: cursor.rowcount(),
            pending,
            column_names,
        }
    }

    /// Decode rows until `n` are cached, or all of them for `None`.
    ///
    /// # Errors
    /// The first decode failure; rows decoded before it stay cached.
    pub fn fill_cache(&mut self, n: Option<usize>) -> Result<()> {
        while n.is_none_or(|n| self.rows.len() < n) {
            let Some(row) = self.pending.pop_front() else {
                break;
            };
            self.rows.push_back(R::from_row(row)?);
        }
        Ok(())
    }

    /// Total rows, decoded or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len() + self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row count reported by the backend.
    #[must_use]
    pub fn rowcount(&self) -> usize {
        self.rowcount
    }

    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// # Errors
    /// Decode failure for any row up to `index`.
    pub fn get(&mut self, index: usize) -> Result<Option<&R>> {
        self.fill_cache(Some(index + 1))?;
        Ok(self.rows.get(index))
    }

    /// Up to the first `n` rows.
    ///
    /// # Errors
    /// Decode failure for any of those rows.
    pub fn head(&mut self, n: usize) -> Result<&[R]> {
        self.fill_cache(Some(n))?;
        let end = n.min(self.rows.len());
        Ok(&self.rows.make_contiguous()[..end])
    }

    /// # Errors
    /// Decode failure for any row.
    pub fn rows(&mut self) -> Result<&[R]> {
        self.fill_cache(None)?;
        Ok(&*self.rows.make_contiguous())
    }

    /// Hand out rows one at a time, front first. Consumed rows leave the cache.
    pub(crate) fn take_next(&mut self) -> Option<Result<R>> {
        if let Some(row) = self.rows.pop_front() {
            return Some(Ok(row));
        }
        self.pending.pop_front().map(R::from_row)
    }

    pub(crate) fn into_rows(mut self) -> Result<Vec<R>> {
        self.fill_cache(None)?;
        Ok(self.rows.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultSet;
    use crate::types::RowValues;

    fn cursor(n: i64) -> Cursor {
        let mut rs = ResultSet::with_capacity(n as usize);
        rs.set_column_names(Arc::new(vec!["id".into(), "data".into()]));
        for id in 1..=n {
            rs.add_row_values(vec![RowValues::Int(id), RowValues::Text(format!("row {id}"))]);
        }
        Cursor::new(rs, None)
    }

    #[test]
    fn random_access_decodes_only_the_prefix() {
        let mut cache: RowCache<Vec<RowValues>> = RowCache::new(cursor(5));
        assert_eq!(cache.len(), 5);

        let third = cache.get(2).unwrap().cloned();
        assert_eq!(third.unwrap()[0], RowValues::Int(3));
        assert_eq!(cache.rows.len(), 3);
        assert_eq!(cache.pending.len(), 2);

        assert!(cache.get(10).unwrap().is_none());
        assert_eq!(cache.rows.len(), 5);
    }

    #[test]
    fn head_caps_at_available_rows() {
        let mut cache: RowCache<CustomDbRow> = RowCache::new(cursor(2));
        assert_eq!(cache.head(1).unwrap().len(), 1);
        assert_eq!(cache.head(10).unwrap().len(), 2);
        assert_eq!(cache.head(10).unwrap()[1].get("data"), Some(&RowValues::Text("row 2".into())));
    }

    #[test]
    fn take_next_drains_in_order() {
        let mut cache: RowCache<Vec<RowValues>> = RowCache::new(cursor(3));
        cache.fill_cache(Some(1)).unwrap();
        let ids: Vec<i64> = std::iter::from_fn(|| cache.take_next())
            .map(|row| *row.unwrap()[0].as_int().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(cache.is_empty());
    }

    #[test]
    fn take_next_after_full_decode_keeps_order() {
        let mut cache: RowCache<Vec<RowValues>> = RowCache::new(cursor(1000));
        assert_eq!(cache.rows().unwrap().len(), 1000);
        assert_eq!(cache.head(2).unwrap()[1][0], RowValues::Int(2));
        let ids: Vec<i64> = std::iter::from_fn(|| cache.take_next())
            .map(|row| *row.unwrap()[0].as_int().unwrap())
            .collect();
        assert_eq!(ids, (1..=1000).collect::<Vec<_>>());
        assert!(cache.is_empty());
    }
}
