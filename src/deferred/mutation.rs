use std::future::IntoFuture;

use async_stream::try_stream;
use futures_util::Stream;
use futures_util::future::BoxFuture;

use super::cache::RowCache;
use super::require_target;
use super::row::{Bind, FromRow};
use crate::database::CommitPolicy;
use crate::error::{OrmError, Result};
use crate::executor::{Executor, Target};
use crate::query::{DeleteQuery, Expr, SqlQuery, SqlWriter, UpdateQuery};
use crate::results::CustomDbRow;
use crate::types::{DatabaseType, RowValues};

/// The statement behind a [`DeferredMutation`].
#[derive(Debug, Clone)]
pub enum MutationQuery {
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl MutationQuery {
    fn has_returning(&self) -> bool {
        match self {
            MutationQuery::Update(q) => q.has_returning(),
            MutationQuery::Delete(q) => q.has_returning(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MutationQuery::Update(_) => "update",
            MutationQuery::Delete(_) => "delete",
        }
    }
}

impl SqlQuery for MutationQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            MutationQuery::Update(q) => q.write_sql(w),
            MutationQuery::Delete(q) => q.write_sql(w),
        }
    }
}

/// An update or delete that runs once.
///
/// Awaiting it yields the affected row count. With a `RETURNING` clause the
/// returned rows are also cached and can be read with [`rows`](Self::rows)
/// or streamed; asking for rows without one is an
/// [`OrmError::UnsupportedOperation`].
pub struct DeferredMutation<R = CustomDbRow> {
    query: MutationQuery,
    model: &'static str,
    target: Option<Target>,
    outcome: Option<(usize, Option<RowCache<R>>)>,
}

impl<R> std::fmt::Debug for DeferredMutation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredMutation")
            .field("model", &self.model)
            .field("query", &self.query)
            .field("target", &self.target.as_ref().map(Target::kind))
            .field("executed", &self.outcome.is_some())
            .finish()
    }
}

impl<R> Clone for DeferredMutation<R> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            model: self.model,
            target: self.target.clone(),
            outcome: None,
        }
    }
}

impl DeferredMutation<CustomDbRow> {
    #[must_use]
    pub fn update(query: UpdateQuery, model: &'static str) -> Self {
        Self::from_query(MutationQuery::Update(query), model)
    }

    #[must_use]
    pub fn delete(query: DeleteQuery, model: &'static str) -> Self {
        Self::from_query(MutationQuery::Delete(query), model)
    }

    fn from_query(query: MutationQuery, model: &'static str) -> Self {
        Self {
            query,
            model,
            target: None,
            outcome: None,
        }
    }
}

impl<R: FromRow> DeferredMutation<R> {
    pub(crate) fn with_target(mut self, target: impl Into<Option<Target>>) -> Self {
        self.target = target.into();
        self
    }

    #[must_use]
    pub fn query(&self) -> &MutationQuery {
        &self.query
    }

    #[must_use]
    pub fn sql(&self, db_type: DatabaseType) -> (String, Vec<RowValues>) {
        self.query.sql(db_type)
    }

    #[must_use]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.query = match self.query {
            MutationQuery::Update(q) => MutationQuery::Update(q.filter(condition)),
            MutationQuery::Delete(q) => MutationQuery::Delete(q.filter(condition)),
        };
        self.outcome = None;
        self
    }

    #[must_use]
    pub fn returning(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.query = match self.query {
            MutationQuery::Update(q) => MutationQuery::Update(q.returning(columns)),
            MutationQuery::Delete(q) => MutationQuery::Delete(q.returning(columns)),
        };
        self.outcome = None;
        self
    }

    /// Shape returned rows differently (tuples, or a model).
    #[must_use]
    pub fn shaped<S: FromRow>(self) -> DeferredMutation<S> {
        DeferredMutation {
            query: self.query,
            model: self.model,
            target: self.target,
            outcome: None,
        }
    }

    #[must_use]
    pub fn tuples(self) -> DeferredMutation<Vec<RowValues>> {
        self.shaped()
    }

    async fn run(&mut self) -> Result<&mut (usize, Option<RowCache<R>>)> {
        if self.outcome.is_none() {
            let target = require_target(self.target.as_ref(), self.model)?;
            if self.query.has_returning() && !target.capabilities().returning {
                return Err(OrmError::UnsupportedOperation(format!(
                    "{} with RETURNING on a backend without RETURNING support",
                    self.query.kind()
                )));
            }
            let (text, params) = self.query.sql(target.db_type());
            let cursor = target.execute_sql(&text, &params, CommitPolicy::Infer).await?;
            let rowcount = cursor.rowcount();
            let rows = self.query.has_returning().then(|| RowCache::new(cursor));
            let affected = rows.as_ref().map_or(rowcount, RowCache::len);
            self.outcome = Some((affected, rows));
        }
        self.outcome.as_mut().ok_or(OrmError::NotExecuted)
    }

    /// Affected row count; runs the statement on first call.
    ///
    /// # Errors
    /// `OrmError::Configuration` with no target bound, or the statement error.
    pub async fn execute(&mut self) -> Result<usize> {
        Ok(self.run().await?.0)
    }

    fn no_returning(&self) -> OrmError {
        OrmError::UnsupportedOperation(format!(
            "cannot iterate a {} on {} without a RETURNING clause",
            self.query.kind(),
            self.model
        ))
    }

    /// Rows produced by the `RETURNING` clause.
    ///
    /// # Errors
    /// `OrmError::UnsupportedOperation` without a `RETURNING` clause, or the
    /// execution failure.
    pub async fn rows(&mut self) -> Result<&mut RowCache<R>> {
        if !self.query.has_returning() {
            return Err(self.no_returning());
        }
        match &mut self.run().await?.1 {
            Some(cache) => Ok(cache),
            None => Err(OrmError::NotExecuted),
        }
    }

    /// Stream the `RETURNING` rows.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<R>> + Send + 'static {
        try_stream! {
            if !self.query.has_returning() {
                Err::<(), OrmError>(self.no_returning())?;
            }
            self.run().await?;
            if let Some((_, Some(mut cache))) = self.outcome.take() {
                while let Some(row) = cache.take_next() {
                    yield row?;
                }
            }
        }
    }
}

impl<R: FromRow> Bind for DeferredMutation<R> {
    fn bind(mut self, target: impl Into<Target>) -> Result<Self> {
        if self.outcome.is_some() {
            return Err(OrmError::AlreadyExecuted(format!(
                "{} {} cannot be rebound after it ran",
                self.model,
                self.query.kind()
            )));
        }
        self.target = Some(target.into());
        Ok(self)
    }
}

impl<R: FromRow> IntoFuture for DeferredMutation<R> {
    type Output = Result<usize>;
    type IntoFuture = BoxFuture<'static, Result<usize>>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::model::{FieldMeta, FieldType, ModelMeta};
    use crate::query::{col, val};

    static ITEM: ModelMeta = ModelMeta::new(
        "Item",
        "item",
        &[
            FieldMeta::new("id", FieldType::Integer),
            FieldMeta::new("data", FieldType::Text),
        ],
    );

    #[tokio::test]
    async fn rows_without_returning_are_unsupported() {
        let db = Database::deferred(DatabaseType::Sqlite);
        let mut update = DeferredMutation::update(
            UpdateQuery::new(&ITEM, vec![("data".into(), val("x"))]),
            ITEM.name,
        )
        .with_target(Target::from(&db))
        .filter(col("id").eq(1));
        let err = update.rows().await.unwrap_err();
        assert!(matches!(err, OrmError::UnsupportedOperation(_)), "{err:?}");
    }

    #[test]
    fn returning_renders_on_both_dialects() {
        let delete = DeferredMutation::delete(DeleteQuery::new(&ITEM), ITEM.name)
            .filter(col("id").eq(2))
            .returning(["id"]);
        let (pg, _) = delete.sql(DatabaseType::Postgres);
        assert_eq!(pg, r#"DELETE FROM "item" WHERE ("id" = $1) RETURNING "id""#);
        let (lite, _) = delete.sql(DatabaseType::Sqlite);
        assert!(lite.ends_with(r#"RETURNING "id""#), "{lite}");
    }
}
