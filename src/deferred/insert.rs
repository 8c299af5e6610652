use std::future::IntoFuture;

use futures_util::future::BoxFuture;
use tracing::debug;

use super::require_target;
use super::row::Bind;
use crate::database::CommitPolicy;
use crate::error::{OrmError, Result};
use crate::executor::{Executor, Target};
use crate::model::ModelMeta;
use crate::query::{InsertQuery, SqlQuery};
use crate::results::{Cursor, CustomDbRow};
use crate::types::{DatabaseType, RowValues};

/// Primary key of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    Single(RowValues),
    /// Values in declaration order of the key columns.
    Composite(Vec<RowValues>),
}

impl PrimaryKey {
    pub(crate) fn from_values(mut values: Vec<RowValues>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(PrimaryKey::Single),
            _ => Some(PrimaryKey::Composite(values)),
        }
    }

    fn from_row(meta: &ModelMeta, row: &CustomDbRow) -> Option<Self> {
        let values = meta
            .primary_key
            .iter()
            .map(|column| row.get(column).cloned())
            .collect::<Option<Vec<_>>>()?;
        Self::from_values(values)
    }

    /// Values in key column order.
    #[must_use]
    pub fn values(&self) -> Vec<RowValues> {
        match self {
            PrimaryKey::Single(value) => vec![value.clone()],
            PrimaryKey::Composite(values) => values.clone(),
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PrimaryKey::Single(value) => value.as_int().copied(),
            PrimaryKey::Composite(_) => None,
        }
    }
}

/// Outcome of an executed insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertResult {
    /// Single row: the supplied or generated key, `None` when the table has
    /// no key or the backend reported none.
    Key(Option<PrimaryKey>),
    /// Several rows with ids requested, in input order.
    Keys(Vec<PrimaryKey>),
    /// Several rows (or `INSERT ... SELECT`) without ids.
    RowCount(usize),
}

impl InsertResult {
    #[must_use]
    pub fn key(&self) -> Option<&PrimaryKey> {
        match self {
            InsertResult::Key(key) => key.as_ref(),
            InsertResult::Keys(keys) => keys.first(),
            InsertResult::RowCount(_) => None,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &[PrimaryKey] {
        match self {
            InsertResult::Keys(keys) => keys,
            InsertResult::Key(Some(key)) => std::slice::from_ref(key),
            InsertResult::Key(None) | InsertResult::RowCount(_) => &[],
        }
    }

    #[must_use]
    pub fn rowcount(&self) -> usize {
        match self {
            InsertResult::Key(_) => 1,
            InsertResult::Keys(keys) => keys.len(),
            InsertResult::RowCount(n) => *n,
        }
    }
}

/// An insert that runs once, on first await or [`execute`](Self::execute).
///
/// A multi-row insert on a backend without multi-row `VALUES` is sent as one
/// statement per row. No transaction wraps that loop: a failure on row K
/// leaves rows before it inserted. Bind to a transaction when the batch must
/// be atomic.
#[derive(Debug, Clone)]
pub struct DeferredInsert {
    query: InsertQuery,
    target: Option<Target>,
    with_ids: bool,
    result: Option<InsertResult>,
}

impl DeferredInsert {
    #[must_use]
    pub fn new(query: InsertQuery) -> Self {
        Self {
            query,
            target: None,
            with_ids: false,
            result: None,
        }
    }

    pub(crate) fn with_target(mut self, target: impl Into<Option<Target>>) -> Self {
        self.target = target.into();
        self
    }

    /// Collect generated keys for a multi-row insert instead of a row count.
    #[must_use]
    pub fn with_ids(mut self, enabled: bool) -> Self {
        self.with_ids = enabled;
        self
    }

    #[must_use]
    pub fn query(&self) -> &InsertQuery {
        &self.query
    }

    #[must_use]
    pub fn sql(&self, db_type: DatabaseType) -> (String, Vec<RowValues>) {
        self.query.sql(db_type)
    }

    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.result.is_some()
    }

    fn target(&self) -> Result<Target> {
        require_target(self.target.as_ref(), self.query.meta().name)
    }

    /// Run the insert, or return the cached outcome.
    ///
    /// # Errors
    /// `OrmError::Configuration` with no target bound, or the statement error.
    pub async fn execute(&mut self) -> Result<InsertResult> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        let target = self.target()?;
        let result = if self.query.is_from_select() {
            let cursor = run(&target, &self.query).await?;
            InsertResult::RowCount(cursor.rowcount())
        } else if self.query.row_count() == 1 {
            InsertResult::Key(insert_one(&target, &self.query).await?)
        } else if !target.capabilities().multi_row_insert {
            debug!(
                model = self.query.meta().name,
                rows = self.query.row_count(),
                "backend lacks multi-row insert; inserting row by row"
            );
            let mut keys = Vec::new();
            let mut inserted = 0;
            for single in self.query.split_rows() {
                let mut row = DeferredInsert::new(single).with_target(target.clone());
                if let Some(key) = row.execute_single().await? {
                    keys.push(key);
                }
                inserted += 1;
            }
            if self.with_ids {
                InsertResult::Keys(keys)
            } else {
                InsertResult::RowCount(inserted)
            }
        } else {
            insert_many(&target, &self.query, self.with_ids).await?
        };
        self.result = Some(result.clone());
        Ok(result)
    }

    async fn execute_single(&mut self) -> Result<Option<PrimaryKey>> {
        let target = self.target()?;
        let key = insert_one(&target, &self.query).await?;
        self.result = Some(InsertResult::Key(key.clone()));
        Ok(key)
    }
}

async fn run(target: &Target, query: &InsertQuery) -> Result<Cursor> {
    let (text, params) = query.sql(target.db_type());
    target.execute_sql(&text, &params, CommitPolicy::Infer).await
}

fn key_columns(meta: &ModelMeta) -> Vec<String> {
    meta.primary_key.iter().map(|c| (*c).to_string()).collect()
}

/// Supplied key if every key column was given, else `RETURNING`, else the
/// backend's last insert id.
async fn insert_one(target: &Target, query: &InsertQuery) -> Result<Option<PrimaryKey>> {
    let meta = query.meta();
    if meta.primary_key.is_empty() {
        run(target, query).await?;
        return Ok(None);
    }
    let supplied = meta
        .primary_key
        .iter()
        .map(|column| query.value_of(0, column).filter(|v| !v.is_null()).cloned())
        .collect::<Option<Vec<_>>>();
    if let Some(values) = supplied {
        run(target, query).await?;
        return Ok(PrimaryKey::from_values(values));
    }
    if target.capabilities().returning {
        let returning = query.clone().returning(key_columns(meta));
        let mut cursor = run(target, &returning).await?;
        return Ok(cursor.fetchone().and_then(|row| PrimaryKey::from_row(meta, &row)));
    }
    let cursor = run(target, query).await?;
    Ok(cursor
        .last_insert_id()
        .filter(|_| meta.primary_key.len() == 1)
        .map(|id| PrimaryKey::Single(RowValues::Int(id))))
}

async fn insert_many(target: &Target, query: &InsertQuery, with_ids: bool) -> Result<InsertResult> {
    let meta = query.meta();
    if with_ids && target.capabilities().returning && !meta.primary_key.is_empty() {
        let returning = query.clone().returning(key_columns(meta));
        let mut cursor = run(target, &returning).await?;
        let keys = cursor
            .fetchall()
            .iter()
            .map(|row| PrimaryKey::from_row(meta, row))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| OrmError::Decode(format!("{} insert returned rows without key columns", meta.name)))?;
        return Ok(InsertResult::Keys(keys));
    }
    let cursor = run(target, query).await?;
    Ok(InsertResult::RowCount(cursor.rowcount()))
}

impl Bind for DeferredInsert {
    fn bind(mut self, target: impl Into<Target>) -> Result<Self> {
        if self.result.is_some() {
            return Err(OrmError::AlreadyExecuted(format!(
                "{} insert cannot be rebound after it ran",
                self.query.meta().name
            )));
        }
        self.target = Some(target.into());
        Ok(self)
    }
}

impl IntoFuture for DeferredInsert {
    type Output = Result<InsertResult>;
    type IntoFuture = BoxFuture<'static, Result<InsertResult>>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_accessors_agree() {
        let one = InsertResult::Key(Some(PrimaryKey::Single(RowValues::Int(7))));
        assert_eq!(one.key().and_then(PrimaryKey::as_int), Some(7));
        assert_eq!(one.keys().len(), 1);
        assert_eq!(one.rowcount(), 1);

        let many = InsertResult::RowCount(3);
        assert!(many.key().is_none());
        assert_eq!(many.rowcount(), 3);
    }

    #[test]
    fn composite_keys_keep_column_order() {
        let key = PrimaryKey::from_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        assert_eq!(
            key.map(|k| k.values()),
            Some(vec![RowValues::Int(1), RowValues::Text("a".into())])
        );
        assert_eq!(PrimaryKey::from_values(Vec::new()), None);
    }
}
