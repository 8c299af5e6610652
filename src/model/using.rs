use std::future::Future;
use std::marker::PhantomData;

use tracing::debug;

use super::facade::{DeleteOptions, SaveOptions};
use super::state::{dirty_fields, snapshot};
use super::{FieldMeta, Model, ModelMeta, schema};
use crate::deferred::{DeferredInsert, DeferredMutation, DeferredSelect, PrimaryKey};
use crate::error::{OrmError, Result};
use crate::executor::Target;
use crate::query::{
    DeleteQuery, Expr, InsertQuery, RawQuery, SelectQuery, UpdateQuery, col, sql, val,
};
use crate::types::RowValues;

/// Model operations pinned to one database or transaction.
///
/// Every query it builds is bound to its target up front; the model's own
/// default is never touched, so concurrent flows can each use their own.
///
/// ```rust,no_run
/// # use sql_async_orm::prelude::*;
/// # async fn demo<M: Model + Default>(db: Database) -> Result<(), OrmError> {
/// db.atomic(|tx| async move {
///     let scoped = M::using(&tx);
///     scoped.create(M::default()).await?;
///     let n = scoped.select().count().await?;
///     # let _ = n;
///     Ok::<_, OrmError>(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct Using<M> {
    target: Option<Target>,
    model: PhantomData<fn() -> M>,
}

impl<M> Clone for Using<M> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            model: PhantomData,
        }
    }
}

impl<M: Model> std::fmt::Debug for Using<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Using")
            .field("model", &M::meta().name)
            .field("target", &self.target.as_ref().map(Target::kind))
            .finish()
    }
}

fn owned<V>(values: Vec<(&str, V)>) -> Vec<(String, V)> {
    values.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn conjunction(terms: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    terms.into_iter().reduce(Expr::and)
}

/// Key column values, if every one is set.
fn key_values<M: Model>(instance: &M) -> Option<Vec<RowValues>> {
    let meta = M::meta();
    if meta.primary_key.is_empty() {
        return None;
    }
    meta.primary_key
        .iter()
        .map(|c| instance.value(c).filter(|v| !v.is_null()))
        .collect()
}

pub(crate) fn primary_key<M: Model>(instance: &M) -> Option<PrimaryKey> {
    key_values(instance).and_then(PrimaryKey::from_values)
}

fn key_condition(meta: &ModelMeta, values: Vec<RowValues>) -> Option<Expr> {
    conjunction(
        meta.primary_key
            .iter()
            .zip(values)
            .map(|(c, v)| col(*c).eq(val(v))),
    )
}

/// A back-reference to clear or delete before its parent row goes.
struct Dependency {
    meta: &'static ModelMeta,
    field: &'static FieldMeta,
    condition: Expr,
}

/// Rows that reference `instance`, transitively, shallowest first. Each model
/// is expanded once. Nullable links are only followed with `search_nullable`.
fn dependencies<M: Model>(instance: &M, search_nullable: bool) -> Vec<Dependency> {
    let root = M::meta();
    let mut stack: Vec<(&'static ModelMeta, Option<Expr>)> = vec![(root, None)];
    let mut seen: Vec<&'static ModelMeta> = Vec::new();
    let mut found = Vec::new();
    while let Some((parent, selector)) = stack.pop() {
        if seen.iter().any(|m| std::ptr::eq(*m, parent)) {
            continue;
        }
        seen.push(parent);
        for child in parent.dependents.iter().map(|f| f()) {
            for (field, fk) in child.foreign_keys_to(parent) {
                let condition = match &selector {
                    None => col(field.name).eq(val(instance.value(fk.column).unwrap_or(RowValues::Null))),
                    Some(parent_rows) => col(field.name).in_query(
                        SelectQuery::new(parent)
                            .columns([col(fk.column)])
                            .filter(parent_rows.clone()),
                    ),
                };
                if !field.nullable || search_nullable {
                    stack.push((child, Some(condition.clone())));
                }
                found.push(Dependency {
                    meta: child,
                    field,
                    condition,
                });
            }
        }
    }
    found
}

impl<M: Model> Using<M> {
    #[must_use]
    pub fn new(target: Option<Target>) -> Self {
        Self {
            target,
            model: PhantomData,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    fn require_target(&self) -> Result<&Target> {
        self.target.as_ref().ok_or_else(|| {
            OrmError::Configuration(format!("{} has no database bound", M::meta().name))
        })
    }

    /// Every row, in the model's default order.
    #[must_use]
    pub fn select(&self) -> DeferredSelect<M> {
        let meta = M::meta();
        let mut query = SelectQuery::new(meta);
        if !meta.order_by.is_empty() {
            query = query.order_by(meta.order_by.iter().map(|&(column, descending)| {
                if descending {
                    col(column).desc()
                } else {
                    col(column).asc()
                }
            }));
        }
        DeferredSelect::select(query).with_target(self.target.clone())
    }

    #[must_use]
    pub fn insert(&self, values: Vec<(&str, RowValues)>) -> DeferredInsert {
        DeferredInsert::new(InsertQuery::values(M::meta(), owned(values))).with_target(self.target.clone())
    }

    #[must_use]
    pub fn insert_many(&self, rows: Vec<Vec<(&str, RowValues)>>) -> DeferredInsert {
        let rows = rows.into_iter().map(owned).collect();
        DeferredInsert::new(InsertQuery::many(M::meta(), rows)).with_target(self.target.clone())
    }

    /// `INSERT INTO <table> (columns) <query>`.
    #[must_use]
    pub fn insert_from(&self, columns: &[&str], query: SelectQuery) -> DeferredInsert {
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        DeferredInsert::new(InsertQuery::from_select(M::meta(), columns, query))
            .with_target(self.target.clone())
    }

    #[must_use]
    pub fn update(&self, values: Vec<(&str, Expr)>) -> DeferredMutation {
        let meta = M::meta();
        DeferredMutation::update(UpdateQuery::new(meta, owned(values)), meta.name)
            .with_target(self.target.clone())
    }

    #[must_use]
    pub fn delete(&self) -> DeferredMutation {
        let meta = M::meta();
        DeferredMutation::delete(DeleteQuery::new(meta), meta.name).with_target(self.target.clone())
    }

    /// Hand-written SQL whose rows decode into the model.
    #[must_use]
    pub fn raw(&self, text: impl Into<String>, params: Vec<RowValues>) -> DeferredSelect<M> {
        DeferredSelect::raw(RawQuery::new(text, params), M::meta().name).with_target(self.target.clone())
    }

    /// Insert `instance` and return it with its key filled in.
    ///
    /// # Errors
    /// The insert failure, e.g. `OrmError::IntegrityViolation`.
    pub async fn create(&self, mut instance: M) -> Result<M> {
        self.save_with(&mut instance, SaveOptions::insert()).await?;
        Ok(instance)
    }

    /// # Errors
    /// `OrmError::RecordNotFound` when nothing matches.
    pub async fn get(&self, condition: Expr) -> Result<M> {
        self.select().filter(condition).get().await
    }

    /// # Errors
    /// Any failure other than a missing row.
    pub async fn get_or_none(&self, condition: Expr) -> Result<Option<M>> {
        self.select().filter(condition).get_or_none().await
    }

    /// Fetch by a single-column primary key.
    ///
    /// # Errors
    /// `OrmError::RecordNotFound` when nothing matches; `OrmError::UnsupportedOperation`
    /// for a model without a single-column key.
    pub fn get_by_id(&self, id: impl Into<RowValues>) -> impl Future<Output = Result<M>> + Send + '_ {
        let id = id.into();
        async move {
            let meta = M::meta();
            let [column] = meta.primary_key else {
                return Err(OrmError::UnsupportedOperation(format!(
                    "{} does not have a single-column primary key",
                    meta.name
                )));
            };
            self.get(col(*column).eq(val(id))).await
        }
    }

    /// Fetch the row matching `lookup`, creating it (with `defaults` on top)
    /// when missing. The flag is `true` when this call inserted it.
    ///
    /// A concurrent insert that wins the race shows up as an integrity
    /// violation; the lookup is then retried once, and if it still finds
    /// nothing the violation is returned.
    ///
    /// # Errors
    /// Lookup or insert failures other than that race.
    pub async fn get_or_create(
        &self,
        lookup: Vec<(&str, RowValues)>,
        defaults: Vec<(&str, RowValues)>,
    ) -> Result<(M, bool)>
    where
        M: Default,
    {
        let condition = conjunction(lookup.iter().map(|(c, v)| col(*c).eq(val(v.clone()))));
        let find = || match &condition {
            Some(cond) => self.select().filter(cond.clone()),
            None => self.select(),
        };
        if let Some(found) = find().get_or_none().await? {
            return Ok((found, false));
        }
        let mut instance = M::default();
        for (field, value) in lookup.iter().chain(&defaults) {
            instance.set_value(field, value.clone())?;
        }
        match self.save_with(&mut instance, SaveOptions::insert()).await {
            Ok(_) => Ok((instance, true)),
            Err(err) if err.is_integrity_violation() => {
                debug!(model = M::meta().name, "get_or_create lost an insert race; retrying lookup");
                match find().get_or_none().await? {
                    Some(found) => Ok((found, false)),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Insert first; on an integrity violation fetch the existing row by the
    /// key and unique columns `instance` carries. The flag is `true` when
    /// this call inserted the row.
    ///
    /// # Errors
    /// The insert failure when it is not an integrity violation, or the
    /// violation itself when no existing row matches.
    pub async fn create_or_get(&self, instance: M) -> Result<(M, bool)> {
        let mut instance = instance;
        let err = match self.save_with(&mut instance, SaveOptions::insert()).await {
            Ok(_) => return Ok((instance, true)),
            Err(err) if err.is_integrity_violation() => err,
            Err(err) => return Err(err),
        };
        let meta = M::meta();
        let unique_index_columns: Vec<&str> = meta
            .indexes
            .iter()
            .filter(|idx| idx.unique)
            .flat_map(|idx| idx.columns.iter().copied())
            .collect();
        let condition = conjunction(
            meta.fields
                .iter()
                .filter(|f| f.unique || meta.is_primary_key(f.name) || unique_index_columns.contains(&f.name))
                .filter_map(|f| {
                    instance
                        .value(f.name)
                        .filter(|v| !v.is_null())
                        .map(|v| col(f.name).eq(val(v)))
                }),
        );
        let Some(condition) = condition else {
            return Err(err);
        };
        match self.get_or_none(condition).await? {
            Some(found) => Ok((found, false)),
            None => Err(err),
        }
    }

    /// Write `instance` back.
    ///
    /// With a key and no `force_insert`, only dirty (or `only`) fields are
    /// updated, and nothing at all is sent when none are; `Ok(0)` then.
    /// Otherwise the set fields are inserted and a generated key is copied
    /// back onto the instance. The dirty set is cleared on success.
    ///
    /// # Errors
    /// The statement failure.
    pub async fn save_with(&self, instance: &mut M, options: SaveOptions) -> Result<usize> {
        let meta = M::meta();
        let target = options.using.or_else(|| self.target.clone());
        let chosen: Vec<&'static str> = match options.only {
            Some(only) => only,
            None => dirty_fields(instance),
        };

        if let (Some(key), false) = (key_values(instance), options.force_insert) {
            let assignments: Vec<(String, Expr)> = chosen
                .iter()
                .filter(|f| !meta.is_primary_key(f))
                .map(|f| ((*f).to_string(), val(instance.value(f).unwrap_or(RowValues::Null))))
                .collect();
            if assignments.is_empty() {
                return Ok(0);
            }
            let Some(condition) = key_condition(meta, key) else {
                return Ok(0);
            };
            let mut update = DeferredMutation::update(UpdateQuery::new(meta, assignments), meta.name)
                .with_target(target)
                .filter(condition);
            let affected = update.execute().await?;
            snapshot(instance);
            return Ok(affected);
        }

        let values: Vec<(String, RowValues)> = meta
            .fields
            .iter()
            .filter(|f| chosen.contains(&f.name) || meta.is_primary_key(f.name))
            .filter_map(|f| {
                instance
                    .value(f.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (f.name.to_string(), v))
            })
            .collect();
        let mut insert = DeferredInsert::new(InsertQuery::values(meta, values)).with_target(target);
        let result = insert.execute().await?;
        if key_values(instance).is_none() {
            if let Some(key) = result.key() {
                for (column, value) in meta.primary_key.iter().zip(key.values()) {
                    instance.set_value(column, value)?;
                }
            }
        }
        snapshot(instance);
        Ok(1)
    }

    /// # Errors
    /// The statement failure.
    pub async fn save(&self, instance: &mut M) -> Result<usize> {
        self.save_with(instance, SaveOptions::default()).await
    }

    /// Delete `instance` by key. With `recursive`, rows referencing it are
    /// handled first, deepest first: nullable links are set to `NULL` unless
    /// `delete_nullable`, everything else is deleted.
    ///
    /// # Errors
    /// `OrmError::UnsupportedOperation` for an instance without a key; the
    /// statement failure otherwise.
    pub async fn delete_instance_with(&self, instance: &M, options: DeleteOptions) -> Result<usize> {
        let meta = M::meta();
        let target = options.using.or_else(|| self.target.clone());
        let condition = key_values(instance)
            .and_then(|key| key_condition(meta, key))
            .ok_or_else(|| {
                OrmError::UnsupportedOperation(format!("cannot delete a {} without a primary key", meta.name))
            })?;

        if options.recursive {
            for dep in dependencies(instance, options.delete_nullable).into_iter().rev() {
                let statement = if dep.field.nullable && !options.delete_nullable {
                    DeferredMutation::update(
                        UpdateQuery::new(dep.meta, vec![(dep.field.name.to_string(), sql("NULL"))]),
                        dep.meta.name,
                    )
                } else {
                    DeferredMutation::delete(DeleteQuery::new(dep.meta), dep.meta.name)
                };
                statement
                    .with_target(target.clone())
                    .filter(dep.condition)
                    .await?;
            }
        }

        DeferredMutation::delete(DeleteQuery::new(meta), meta.name)
            .with_target(target)
            .filter(condition)
            .await
    }

    /// # Errors
    /// The statement failure.
    pub async fn delete_instance(&self, instance: &M) -> Result<usize> {
        self.delete_instance_with(instance, DeleteOptions::default()).await
    }

    /// # Errors
    /// The catalog query failure.
    pub async fn table_exists(&self) -> Result<bool> {
        let meta = M::meta();
        self.require_target()?.table_exists(meta.table_name, meta.schema).await
    }

    /// Create the table and its indexes; `safe` makes a second call a no-op.
    /// Returns whether anything was created.
    ///
    /// # Errors
    /// The DDL failure.
    pub async fn create_table(&self, safe: bool) -> Result<bool> {
        schema::create_table(self.require_target()?, M::meta(), safe).await
    }

    /// # Errors
    /// The DDL failure.
    pub async fn drop_table(&self, safe: bool) -> Result<()> {
        schema::drop_table(self.require_target()?, M::meta(), safe, false).await
    }

    /// # Errors
    /// The statement failure.
    pub async fn truncate_table(&self) -> Result<usize> {
        schema::truncate_table(self.require_target()?, M::meta()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, ModelState};
    use crate::query::SqlQuery;
    use crate::results::CustomDbRow;
    use crate::types::DatabaseType;

    static USER: ModelMeta = ModelMeta::new(
        "User",
        "users",
        &[FieldMeta::new("id", FieldType::Integer).auto_increment()],
    )
    .primary_key(&["id"])
    .dependents(&[post_meta]);

    static POST: ModelMeta = ModelMeta::new(
        "Post",
        "post",
        &[
            FieldMeta::new("id", FieldType::Integer).auto_increment(),
            FieldMeta::new("user_id", FieldType::Integer).references(user_meta, "id"),
        ],
    )
    .primary_key(&["id"])
    .dependents(&[comment_meta]);

    static COMMENT: ModelMeta = ModelMeta::new(
        "Comment",
        "comment",
        &[
            FieldMeta::new("id", FieldType::Integer).auto_increment(),
            FieldMeta::new("post_id", FieldType::Integer)
                .nullable()
                .references(post_meta, "id"),
        ],
    )
    .primary_key(&["id"]);

    fn user_meta() -> &'static ModelMeta {
        &USER
    }

    fn post_meta() -> &'static ModelMeta {
        &POST
    }

    fn comment_meta() -> &'static ModelMeta {
        &COMMENT
    }

    #[derive(Debug, Clone, Default)]
    struct User {
        id: Option<i64>,
        state: ModelState,
    }

    impl Model for User {
        fn meta() -> &'static ModelMeta {
            &USER
        }

        fn decode(row: &CustomDbRow) -> Result<Self> {
            Ok(User {
                id: row.try_get("id")?,
                state: ModelState::default(),
            })
        }

        fn value(&self, field: &str) -> Option<RowValues> {
            (field == "id").then(|| self.id.into())
        }

        fn set_value(&mut self, field: &str, value: RowValues) -> Result<()> {
            if field == "id" {
                self.id = value.as_int().copied();
            }
            Ok(())
        }

        fn state(&self) -> &ModelState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ModelState {
            &mut self.state
        }
    }

    #[test]
    fn dependencies_walk_back_references_shallowest_first() {
        let user = User {
            id: Some(7),
            state: ModelState::default(),
        };
        let deps = dependencies(&user, false);
        let tables: Vec<&str> = deps.iter().map(|d| d.meta.table_name).collect();
        assert_eq!(tables, vec!["post", "comment"]);

        let (direct, params) = SelectQuery::new(&POST)
            .columns([sql("1")])
            .filter(deps[0].condition.clone())
            .sql(DatabaseType::Sqlite);
        assert_eq!(direct, r#"SELECT 1 FROM "post" WHERE ("user_id" = ?1)"#);
        assert_eq!(params, vec![RowValues::Int(7)]);

        let (nested, _) = SelectQuery::new(&COMMENT)
            .columns([sql("1")])
            .filter(deps[1].condition.clone())
            .sql(DatabaseType::Sqlite);
        assert_eq!(
            nested,
            r#"SELECT 1 FROM "comment" WHERE ("post_id" IN (SELECT "id" FROM "post" WHERE ("user_id" = ?1)))"#
        );
    }

    #[tokio::test]
    async fn unbound_models_fail_at_execution_not_construction() {
        let scoped = Using::<User>::new(None);
        let q = scoped.select().filter(col("id").eq(1));
        assert!(q.target().is_none());
        let err = scoped.table_exists().await.unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)), "{err:?}");
    }
}
