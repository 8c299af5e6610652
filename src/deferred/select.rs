use std::future::IntoFuture;

use async_stream::try_stream;
use futures_util::Stream;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::cache::RowCache;
use super::require_target;
use super::row::{Bind, FromRow};
use crate::database::CommitPolicy;
use crate::error::{OrmError, Result};
use crate::executor::{Executor, Target};
use crate::query::{Expr, Ordering, RawQuery, ReadQuery, SelectQuery, SqlQuery, sql};
use crate::results::{CustomDbRow, Cursor};
use crate::types::{DatabaseType, RowValues};

/// A select (or raw) query that runs on first use and caches its rows.
///
/// Builder methods return a new handle with an empty cache. Once executed,
/// read accessors reuse the cache until something invalidates it, such as
/// [`first_n`](Self::first_n) with a different row count.
///
/// ```rust,no_run
/// use sql_async_orm::prelude::*;
///
/// # async fn demo(db: Database) -> Result<(), OrmError> {
/// let mut rows = db.raw("SELECT id, data FROM item WHERE id > ?", vec![0.into()]);
/// for row in rows.execute().await?.rows()? {
///     println!("{:?}", row.get("data"));
/// }
/// let all = db.raw("SELECT id FROM item", vec![]).tuples().await?;
/// # let _ = all;
/// # Ok(())
/// # }
/// ```
pub struct DeferredSelect<R> {
    query: ReadQuery,
    model: &'static str,
    target: Option<Target>,
    cache: Option<RowCache<R>>,
}

impl<R> std::fmt::Debug for DeferredSelect<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSelect")
            .field("model", &self.model)
            .field("query", &self.query)
            .field("target", &self.target.as_ref().map(Target::kind))
            .field("executed", &self.cache.is_some())
            .finish()
    }
}

/// Clones share the query and target but never the cache.
impl<R> Clone for DeferredSelect<R> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            model: self.model,
            target: self.target.clone(),
            cache: None,
        }
    }
}

impl<R: FromRow> DeferredSelect<R> {
    #[must_use]
    pub fn select(query: SelectQuery) -> Self {
        let model = query.model().map_or("query", |meta| meta.name);
        Self::from_query(ReadQuery::Select(query), model)
    }

    #[must_use]
    pub fn raw(query: RawQuery, model: &'static str) -> Self {
        Self::from_query(ReadQuery::Raw(query), model)
    }

    fn from_query(query: ReadQuery, model: &'static str) -> Self {
        Self {
            query,
            model,
            target: None,
            cache: None,
        }
    }

    pub(crate) fn with_target(mut self, target: impl Into<Option<Target>>) -> Self {
        self.target = target.into();
        self
    }

    #[must_use]
    pub fn query(&self) -> &ReadQuery {
        &self.query
    }

    #[must_use]
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// SQL and parameters as they would be sent to `db_type`.
    #[must_use]
    pub fn sql(&self, db_type: DatabaseType) -> (String, Vec<RowValues>) {
        self.query.sql(db_type)
    }

    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.cache.is_some()
    }

    /// Drop cached rows; the next read executes again.
    pub fn reset(&mut self) {
        self.cache = None;
    }

    fn reshape<S: FromRow>(self) -> DeferredSelect<S> {
        DeferredSelect {
            query: self.query,
            model: self.model,
            target: self.target,
            cache: None,
        }
    }

    /// Rows as value tuples in column order.
    #[must_use]
    pub fn tuples(self) -> DeferredSelect<Vec<RowValues>> {
        self.reshape()
    }

    /// Rows addressed by column name.
    #[must_use]
    pub fn dicts(self) -> DeferredSelect<CustomDbRow> {
        self.reshape()
    }

    /// Rows decoded into any other shape, e.g. a model for a raw query.
    #[must_use]
    pub fn shaped<S: FromRow>(self) -> DeferredSelect<S> {
        self.reshape()
    }

    /// Apply a builder step; a raw query is wrapped as a derived table first.
    fn map_select(self, f: impl FnOnce(SelectQuery) -> SelectQuery) -> Self {
        let select = match self.query {
            ReadQuery::Select(q) => q,
            raw @ ReadQuery::Raw(_) => SelectQuery::from_subquery(raw, "_raw"),
        };
        Self {
            query: ReadQuery::Select(f(select)),
            model: self.model,
            target: self.target,
            cache: None,
        }
    }

    #[must_use]
    pub fn columns(self, columns: impl IntoIterator<Item = Expr>) -> Self {
        self.map_select(|q| q.columns(columns))
    }

    /// Add a condition, `AND`ed with any existing one.
    #[must_use]
    pub fn filter(self, condition: Expr) -> Self {
        self.map_select(|q| q.filter(condition))
    }

    #[must_use]
    pub fn group_by(self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.map_select(|q| q.group_by(exprs))
    }

    #[must_use]
    pub fn having(self, condition: Expr) -> Self {
        self.map_select(|q| q.having(condition))
    }

    #[must_use]
    pub fn order_by<O: Into<Ordering>>(self, ordering: impl IntoIterator<Item = O>) -> Self {
        self.map_select(|q| q.order_by(ordering))
    }

    #[must_use]
    pub fn limit(self, limit: u64) -> Self {
        self.map_select(|q| q.limit(limit))
    }

    #[must_use]
    pub fn offset(self, offset: u64) -> Self {
        self.map_select(|q| q.offset(offset))
    }

    /// 1-based page of `per_page` rows.
    #[must_use]
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        self.map_select(|q| q.paginate(page, per_page))
    }

    #[must_use]
    pub fn distinct(self) -> Self {
        self.map_select(SelectQuery::distinct)
    }

    #[must_use]
    pub fn window(self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.map_select(|q| q.window(name, definition))
    }

    fn check_placeholders(query: &ReadQuery) -> Result<()> {
        if let ReadQuery::Raw(raw) = query {
            let expected = raw.placeholder_count();
            if expected != raw.params().len() {
                return Err(OrmError::Configuration(format!(
                    "raw query has {expected} placeholders but {} parameters",
                    raw.params().len()
                )));
            }
        }
        Ok(())
    }

    async fn run(&self, query: &impl SqlQuery) -> Result<Cursor> {
        let target = require_target(self.target.as_ref(), self.model)?;
        let (text, params) = query.sql(target.db_type());
        debug!(model = self.model, target = target.kind(), "executing deferred select");
        target.execute_sql(&text, &params, CommitPolicy::Infer).await
    }

    /// Run the query unless results are already cached.
    ///
    /// # Errors
    /// `OrmError::Configuration` with no target bound or a raw query whose
    /// placeholder count does not match its parameters; otherwise the
    /// statement error.
    pub async fn execute(&mut self) -> Result<&mut RowCache<R>> {
        if self.cache.is_none() {
            Self::check_placeholders(&self.query)?;
            let cursor = self.run(&self.query).await?;
            self.cache = Some(RowCache::new(cursor));
        }
        self.cache.as_mut().ok_or(OrmError::NotExecuted)
    }

    /// Up to `n` rows from the cached result, executing first if needed.
    /// Never changes the query.
    ///
    /// # Errors
    /// Execution or decode failure.
    pub async fn peek(&mut self, n: usize) -> Result<Vec<R>> {
        Ok(self.execute().await?.head(n)?.to_vec())
    }

    /// The first `n` rows. A select is re-limited to `n`, which re-executes
    /// when `n` differs from the current limit.
    ///
    /// # Errors
    /// Execution or decode failure.
    pub async fn first_n(&mut self, n: usize) -> Result<Vec<R>> {
        let wanted = n as u64;
        if let Some(select) = self.query.as_select_mut() {
            if select.limit_value() != Some(wanted) {
                select.set_limit(Some(wanted));
                self.cache = None;
            }
        }
        self.peek(n).await
    }

    /// # Errors
    /// Execution or decode failure.
    pub async fn first(&mut self) -> Result<Option<R>> {
        Ok(self.first_n(1).await?.into_iter().next())
    }

    /// Like [`first`](Self::first), but a missing row is an error.
    ///
    /// # Errors
    /// `OrmError::RecordNotFound` carrying the SQL and parameters that matched nothing.
    pub async fn get(&mut self) -> Result<R> {
        if let Some(row) = self.first().await? {
            return Ok(row);
        }
        let target = require_target(self.target.as_ref(), self.model)?;
        let (sql, params) = self.query.sql(target.db_type());
        Err(OrmError::RecordNotFound {
            model: self.model,
            sql,
            params,
        })
    }

    /// Like [`get`](Self::get), with no match mapped to `None`.
    ///
    /// # Errors
    /// Any failure other than `RecordNotFound`.
    pub async fn get_or_none(&mut self) -> Result<Option<R>> {
        match self.get().await {
            Ok(row) => Ok(Some(row)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The count query, with the row limit kept unless `clear_limit`.
    fn count_query(&self, clear_limit: bool) -> SelectQuery {
        let mut inner = self.query.clone();
        if let Some(q) = inner.as_select_mut() {
            q.clear_order_by();
            if clear_limit {
                q.set_limit(None);
                q.set_offset(None);
            }
            if !q.projection_shapes_rows() {
                q.set_columns(vec![sql("1")]);
            }
        }
        SelectQuery::from_subquery(inner, "_wrapped").columns([sql("COUNT(1)")])
    }

    /// Rows the query would return, counted by the backend.
    ///
    /// # Errors
    /// Execution failure.
    pub async fn count(&self) -> Result<i64> {
        self.count_with(false).await
    }

    /// # Errors
    /// Execution failure.
    pub async fn count_with(&self, clear_limit: bool) -> Result<i64> {
        Self::check_placeholders(&self.query)?;
        let mut cursor = self.run(&self.count_query(clear_limit)).await?;
        let count = cursor
            .fetchone()
            .and_then(|row| row.get_by_index(0).and_then(RowValues::as_int).copied());
        Ok(count.unwrap_or(0))
    }

    /// First row as a tuple, from a fresh execution.
    ///
    /// # Errors
    /// Execution failure.
    pub async fn scalar_tuple(&self) -> Result<Option<Vec<RowValues>>> {
        Self::check_placeholders(&self.query)?;
        let mut cursor = self.run(&self.query).await?;
        Ok(cursor.fetchone().map(CustomDbRow::into_values))
    }

    /// First column of the first row.
    ///
    /// # Errors
    /// Execution failure.
    pub async fn scalar(&self) -> Result<Option<RowValues>> {
        Ok(self
            .scalar_tuple()
            .await?
            .and_then(|values| values.into_iter().next()))
    }

    /// Whether any row matches, probed with `SELECT 1 ... LIMIT 1`.
    ///
    /// # Errors
    /// Execution failure.
    pub async fn exists(&self) -> Result<bool> {
        Self::check_placeholders(&self.query)?;
        let probe = match self.query.clone() {
            ReadQuery::Select(mut q) => {
                q.set_columns(vec![sql("1")]);
                q.clear_order_by();
                q.set_limit(Some(1));
                q.set_offset(None);
                q
            }
            raw @ ReadQuery::Raw(_) => SelectQuery::from_subquery(raw, "_wrapped")
                .columns([sql("1")])
                .limit(1),
        };
        let cursor = self.run(&probe).await?;
        Ok(cursor.remaining() > 0)
    }

    /// Iterate cached rows without executing.
    ///
    /// # Errors
    /// `OrmError::NotExecuted` before the first execution; decode failure.
    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, R>> {
        let cache = self.cache.as_mut().ok_or(OrmError::NotExecuted)?;
        Ok(cache.rows()?.iter())
    }

    /// Row `index`, decoding only up to it.
    ///
    /// # Errors
    /// Execution or decode failure.
    pub async fn get_index(&mut self, index: usize) -> Result<Option<R>> {
        Ok(self.execute().await?.get(index)?.cloned())
    }

    /// # Errors
    /// Execution failure.
    pub async fn len(&mut self) -> Result<usize> {
        Ok(self.execute().await?.len())
    }

    /// # Errors
    /// Execution failure.
    pub async fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Every row, cloned out of the cache.
    ///
    /// # Errors
    /// Execution or decode failure.
    pub async fn all(&mut self) -> Result<Vec<R>> {
        Ok(self.execute().await?.rows()?.to_vec())
    }

    /// Every row, owned; the handle is consumed.
    ///
    /// # Errors
    /// Execution or decode failure.
    pub async fn iterator(mut self) -> Result<Vec<R>> {
        self.execute().await?;
        match self.cache.take() {
            Some(cache) => cache.into_rows(),
            None => Err(OrmError::NotExecuted),
        }
    }

    /// Single pass over the rows: executes on first poll, then yields rows
    /// one at a time.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<R>> + Send + 'static {
        try_stream! {
            self.execute().await?;
            if let Some(mut cache) = self.cache.take() {
                while let Some(row) = cache.take_next() {
                    yield row?;
                }
            }
        }
    }
}

impl<R: FromRow> Bind for DeferredSelect<R> {
    fn bind(mut self, target: impl Into<Target>) -> Result<Self> {
        if self.cache.is_some() {
            return Err(OrmError::AlreadyExecuted(format!(
                "{} select cannot be rebound after its rows were fetched",
                self.model
            )));
        }
        self.target = Some(target.into());
        Ok(self)
    }
}

/// Awaiting a select yields every row.
impl<R: FromRow> IntoFuture for DeferredSelect<R> {
    type Output = Result<Vec<R>>;
    type IntoFuture = BoxFuture<'static, Result<Vec<R>>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.iterator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, FieldType, ModelMeta};
    use crate::query::col;

    static ITEM: ModelMeta = ModelMeta::new(
        "Item",
        "item",
        &[
            FieldMeta::new("id", FieldType::Integer),
            FieldMeta::new("data", FieldType::Text),
        ],
    );

    fn item() -> DeferredSelect<CustomDbRow> {
        DeferredSelect::select(SelectQuery::new(&ITEM))
    }

    #[test]
    fn count_collapses_plain_projection() {
        let q = item().filter(col("id").gt(0)).order_by([col("id").desc()]);
        let (sql, params) = q.count_query(false).sql(DatabaseType::Sqlite);
        assert_eq!(
            sql,
            r#"SELECT COUNT(1) FROM (SELECT 1 FROM "item" WHERE ("id" > ?1)) AS "_wrapped""#
        );
        assert_eq!(params, vec![RowValues::Int(0)]);
    }

    #[test]
    fn count_keeps_projection_when_it_shapes_rows() {
        let q = item().columns([col("data")]).group_by([col("data")]);
        let (sql, _) = q.count_query(false).sql(DatabaseType::Postgres);
        assert_eq!(
            sql,
            r#"SELECT COUNT(1) FROM (SELECT "data" FROM "item" GROUP BY "data") AS "_wrapped""#
        );

        let (sql, _) = item().columns([col("data")]).distinct().count_query(false).sql(DatabaseType::Postgres);
        assert!(sql.contains("SELECT DISTINCT \"data\""), "{sql}");
    }

    #[test]
    fn count_can_clear_the_limit() {
        let q = item().limit(5).offset(10);
        let (kept, _) = q.count_query(false).sql(DatabaseType::Postgres);
        assert!(kept.contains("LIMIT 5 OFFSET 10"), "{kept}");
        let (cleared, _) = q.count_query(true).sql(DatabaseType::Postgres);
        assert!(!cleared.contains("LIMIT"), "{cleared}");
    }

    #[test]
    fn builder_steps_wrap_raw_queries() {
        let q: DeferredSelect<CustomDbRow> =
            DeferredSelect::raw(RawQuery::new("SELECT * FROM item WHERE id > ?", vec![1.into()]), "Item")
                .limit(2);
        let (sql, params) = q.sql(DatabaseType::Postgres);
        assert_eq!(
            sql,
            r#"SELECT * FROM (SELECT * FROM item WHERE id > $1) AS "_raw" LIMIT 2"#
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn rebinding_before_execution_is_allowed() {
        let db = crate::database::Database::deferred(DatabaseType::Sqlite);
        let q = item().bind(&db).unwrap();
        assert_eq!(q.target().map(Target::kind), Some("database"));
        assert!(!q.clone().is_executed());
    }

    #[tokio::test]
    async fn unbound_queries_report_configuration_errors() {
        let mut q = item();
        let err = q.execute().await.unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)), "{err:?}");
        assert!(matches!(q.iter().unwrap_err(), OrmError::NotExecuted));
    }

    #[tokio::test]
    async fn raw_placeholder_mismatch_is_rejected_before_io() {
        let db = crate::database::Database::deferred(DatabaseType::Sqlite);
        let mut q: DeferredSelect<CustomDbRow> =
            DeferredSelect::raw(RawQuery::new("SELECT ?, ?", vec![1.into()]), "raw query")
                .with_target(Target::from(&db));
        let err = q.execute().await.unwrap_err();
        assert!(matches!(err, OrmError::Configuration(ref m) if m.contains("2 placeholders")), "{err:?}");
    }
}
