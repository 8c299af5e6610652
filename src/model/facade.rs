use std::future::Future;

use super::state::{dirty_fields, snapshot};
use super::using::primary_key;
use super::{Model, Using};
use crate::deferred::{DeferredInsert, DeferredMutation, DeferredSelect, PrimaryKey};
use crate::error::Result;
use crate::executor::Target;
use crate::query::{Expr, SelectQuery};
use crate::types::RowValues;

/// Options for [`ModelExt::save_with`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Insert even when the instance already has a key.
    pub force_insert: bool,
    /// Write exactly these fields instead of the dirty ones.
    pub only: Option<Vec<&'static str>>,
    /// Run against this target instead of the model's default.
    pub using: Option<Target>,
}

impl SaveOptions {
    #[must_use]
    pub fn insert() -> Self {
        Self {
            force_insert: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn only(mut self, fields: &[&'static str]) -> Self {
        self.only = Some(fields.to_vec());
        self
    }

    #[must_use]
    pub fn using(mut self, target: impl Into<Target>) -> Self {
        self.using = Some(target.into());
        self
    }
}

/// Options for [`ModelExt::delete_instance_with`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Handle rows that reference this one first.
    pub recursive: bool,
    /// Delete referencing rows even where the link could be set to `NULL`.
    pub delete_nullable: bool,
    pub using: Option<Target>,
}

impl DeleteOptions {
    #[must_use]
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn delete_nullable(mut self, enabled: bool) -> Self {
        self.delete_nullable = enabled;
        self
    }

    #[must_use]
    pub fn using(mut self, target: impl Into<Target>) -> Self {
        self.using = Some(target.into());
        self
    }
}

/// Async persistence and query helpers for every [`Model`].
///
/// Static helpers run against [`Model::database`]; [`ModelExt::using`]
/// pins them to an explicit database or transaction instead.
#[allow(clippy::manual_async_fn)]
pub trait ModelExt: Model {
    /// The same helpers, bound to `target`.
    fn using(target: impl Into<Target>) -> Using<Self> {
        Using::new(Some(target.into()))
    }

    /// The helpers bound to the model's default target.
    fn objects() -> Using<Self> {
        Using::new(Self::database())
    }

    fn select() -> DeferredSelect<Self> {
        Self::objects().select()
    }

    fn insert(values: Vec<(&str, RowValues)>) -> DeferredInsert {
        Self::objects().insert(values)
    }

    fn insert_many(rows: Vec<Vec<(&str, RowValues)>>) -> DeferredInsert {
        Self::objects().insert_many(rows)
    }

    fn insert_from(columns: &[&str], query: SelectQuery) -> DeferredInsert {
        Self::objects().insert_from(columns, query)
    }

    fn update(values: Vec<(&str, Expr)>) -> DeferredMutation {
        Self::objects().update(values)
    }

    fn delete() -> DeferredMutation {
        Self::objects().delete()
    }

    fn raw(text: impl Into<String>, params: Vec<RowValues>) -> DeferredSelect<Self> {
        Self::objects().raw(text, params)
    }

    fn create(instance: Self) -> impl Future<Output = Result<Self>> + Send {
        async move { Self::objects().create(instance).await }
    }

    fn get(condition: Expr) -> impl Future<Output = Result<Self>> + Send {
        async move { Self::objects().get(condition).await }
    }

    fn get_or_none(condition: Expr) -> impl Future<Output = Result<Option<Self>>> + Send {
        async move { Self::objects().get_or_none(condition).await }
    }

    fn get_by_id(id: impl Into<RowValues>) -> impl Future<Output = Result<Self>> + Send {
        let id = id.into();
        async move { Self::objects().get_by_id(id).await }
    }

    fn get_or_create(
        lookup: Vec<(&'static str, RowValues)>,
        defaults: Vec<(&'static str, RowValues)>,
    ) -> impl Future<Output = Result<(Self, bool)>> + Send
    where
        Self: Default,
    {
        async move { Self::objects().get_or_create(lookup, defaults).await }
    }

    fn create_or_get(instance: Self) -> impl Future<Output = Result<(Self, bool)>> + Send {
        async move { Self::objects().create_or_get(instance).await }
    }

    fn table_exists() -> impl Future<Output = Result<bool>> + Send {
        async move { Self::objects().table_exists().await }
    }

    fn create_table(safe: bool) -> impl Future<Output = Result<bool>> + Send {
        async move { Self::objects().create_table(safe).await }
    }

    fn drop_table(safe: bool) -> impl Future<Output = Result<()>> + Send {
        async move { Self::objects().drop_table(safe).await }
    }

    fn truncate_table() -> impl Future<Output = Result<usize>> + Send {
        async move { Self::objects().truncate_table().await }
    }

    fn save(&mut self) -> impl Future<Output = Result<usize>> + Send {
        self.save_with(SaveOptions::default())
    }

    fn save_with(&mut self, options: SaveOptions) -> impl Future<Output = Result<usize>> + Send {
        async move { Self::objects().save_with(self, options).await }
    }

    fn delete_instance(&self) -> impl Future<Output = Result<usize>> + Send {
        self.delete_instance_with(DeleteOptions::default())
    }

    fn delete_instance_with(&self, options: DeleteOptions) -> impl Future<Output = Result<usize>> + Send {
        async move { Self::objects().delete_instance_with(self, options).await }
    }

    /// Fields changed since the last load or save.
    fn dirty_fields(&self) -> Vec<&'static str> {
        dirty_fields(self)
    }

    fn is_dirty(&self) -> bool {
        !dirty_fields(self).is_empty()
    }

    /// Treat the current values as what the database holds.
    fn mark_persisted(&mut self) {
        snapshot(self);
    }

    /// The key, once every key column has a value.
    fn pk(&self) -> Option<PrimaryKey> {
        primary_key(self)
    }
}

impl<M: Model> ModelExt for M {}
