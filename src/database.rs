use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::deferred::DeferredSelect;
use crate::error::{OrmError, Result};
use crate::executor::{Executor, Target};
use crate::model::{ModelMeta, schema};
use crate::pool::{BackendSettings, MiddlewarePoolConnection, PoolAdapter};
#[cfg(feature = "postgres")]
use crate::postgres::PostgresOptions;
use crate::query::RawQuery;
use crate::results::{Cursor, CustomDbRow};
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteOptions;
use crate::transaction::Transaction;
use crate::types::{Capabilities, DatabaseType, RowValues};

/// When the single-statement path wraps a statement in `BEGIN`/`COMMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    Always,
    /// The caller manages the transaction (or wants autocommit).
    Never,
    /// Commit unless the statement is a read.
    Infer,
}

impl CommitPolicy {
    #[must_use]
    pub fn should_commit(self, sql: &str, commit_select: bool) -> bool {
        match self {
            CommitPolicy::Always => true,
            CommitPolicy::Never => false,
            CommitPolicy::Infer => commit_select || !is_read(sql),
        }
    }
}

fn is_read(sql: &str) -> bool {
    let head = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    head.get(..6)
        .is_some_and(|kw| kw.eq_ignore_ascii_case("select"))
}

/// Everything needed to open a database, loadable from a config file.
///
/// ```rust
/// use sql_async_orm::DatabaseConfig;
///
/// let config: DatabaseConfig = serde_json::from_str(
///     r#"{"backend": "sqlite", "db_path": "app.db", "autorollback": true}"#,
/// ).unwrap();
/// assert!(config.autorollback);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(flatten)]
    pub backend: BackendSettings,
    /// Roll back a failed single statement that was wrapped in a transaction.
    #[serde(default)]
    pub autorollback: bool,
    /// Also commit reads under [`CommitPolicy::Infer`].
    #[serde(default)]
    pub commit_select: bool,
    /// Overrides the backend's default capabilities.
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(backend: BackendSettings) -> Self {
        Self {
            backend,
            autorollback: false,
            commit_select: false,
            capabilities: None,
        }
    }

    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite(opts: SqliteOptions) -> Self {
        Self::new(BackendSettings::Sqlite(opts))
    }

    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn postgres(opts: PostgresOptions) -> Self {
        Self::new(BackendSettings::Postgres(opts))
    }

    #[must_use]
    pub fn autorollback(mut self, enabled: bool) -> Self {
        self.autorollback = enabled;
        self
    }

    #[must_use]
    pub fn commit_select(mut self, enabled: bool) -> Self {
        self.commit_select = enabled;
        self
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    fn options(&self) -> DatabaseOptions {
        DatabaseOptions {
            autorollback: self.autorollback,
            commit_select: self.commit_select,
            capabilities: self
                .capabilities
                .unwrap_or_else(|| Capabilities::for_backend(self.backend.db_type())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DatabaseOptions {
    autorollback: bool,
    commit_select: bool,
    capabilities: Capabilities,
}

struct DatabaseInner {
    db_type: DatabaseType,
    pool: PoolAdapter,
    options: RwLock<DatabaseOptions>,
    next_tx_id: AtomicU64,
}

/// A database handle. Cheap to clone; clones share one pool.
///
/// The pool opens lazily on the first statement:
/// ```rust,no_run
/// use sql_async_orm::prelude::*;
///
/// # async fn demo() -> Result<(), OrmError> {
/// let db = Database::new(DatabaseConfig::sqlite(SqliteOptions::new("app.db")));
/// let mut cursor = db.execute_sql("SELECT 1", &[], CommitPolicy::Infer).await?;
/// assert_eq!(cursor.fetchall().len(), 1);
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_type", &self.inner.db_type)
            .field("options", &self.options())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Create a handle. No connection is opened until first use.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        let options = config.options();
        Self::build(
            config.backend.db_type(),
            PoolAdapter::new(config.backend),
            options,
        )
    }

    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite(opts: SqliteOptions) -> Self {
        Self::new(DatabaseConfig::sqlite(opts))
    }

    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn postgres(opts: PostgresOptions) -> Self {
        Self::new(DatabaseConfig::postgres(opts))
    }

    /// A handle whose settings arrive later through [`init`](Self::init).
    /// Until then `connect` is a configuration error and `close` a state error.
    #[must_use]
    pub fn deferred(db_type: DatabaseType) -> Self {
        Self::build(
            db_type,
            PoolAdapter::unconfigured(),
            DatabaseOptions {
                autorollback: false,
                commit_select: false,
                capabilities: Capabilities::for_backend(db_type),
            },
        )
    }

    fn build(db_type: DatabaseType, pool: PoolAdapter, options: DatabaseOptions) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                db_type,
                pool,
                options: RwLock::new(options),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    /// Supply settings to a deferred (or closed) database.
    ///
    /// # Errors
    /// Returns `OrmError::Configuration` if the settings are for a different
    /// backend, or `OrmError::State` while the pool is open.
    pub async fn init(&self, config: DatabaseConfig) -> Result<()> {
        if config.backend.db_type() != self.inner.db_type {
            return Err(OrmError::Configuration(format!(
                "database was declared for {:?} but configured for {:?}",
                self.inner.db_type,
                config.backend.db_type()
            )));
        }
        let options = config.options();
        self.inner.pool.configure(config.backend).await?;
        *self
            .inner
            .options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = options;
        Ok(())
    }

    fn options(&self) -> DatabaseOptions {
        *self
            .inner
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn db_type(&self) -> DatabaseType {
        self.inner.db_type
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.options().capabilities
    }

    #[must_use]
    pub fn autorollback(&self) -> bool {
        self.options().autorollback
    }

    pub(crate) async fn acquire(&self) -> Result<MiddlewarePoolConnection> {
        self.inner.pool.acquire().await
    }

    pub(crate) fn release(&self, conn: MiddlewarePoolConnection) {
        self.inner.pool.release(conn);
    }

    /// Open the pool now instead of on first use. Idempotent.
    ///
    /// # Errors
    /// Returns `OrmError::Configuration` on a deferred database that was never initialized.
    pub async fn connect(&self) -> Result<()> {
        self.inner.pool.connect().await
    }

    /// Close the pool. Idempotent; the next statement reopens it.
    ///
    /// # Errors
    /// Returns `OrmError::State` on a deferred database that was never initialized.
    pub async fn close(&self) -> Result<()> {
        self.inner.pool.close().await.map(|_| ())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.pool.is_closed().await
    }

    /// Execution context for one statement.
    ///
    /// Checks a connection out, runs `sql` (inside `BEGIN`/`COMMIT` when the
    /// policy asks for a commit) and hands the connection back whatever the
    /// outcome.
    ///
    /// # Errors
    /// Returns `OrmError::Connection` when no connection can be had, or the
    /// classified statement error.
    pub async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
        policy: CommitPolicy,
    ) -> Result<Cursor> {
        let options = self.options();
        let commit = policy.should_commit(sql, options.commit_select);
        let mut conn = self.acquire().await?;
        debug!(sql, params = params.len(), commit, "executing statement");
        let result = run_statement(&mut conn, sql, params, commit, options.autorollback).await;
        self.release(conn);
        result
    }

    /// A new, unopened transaction. It begins on its first statement.
    #[must_use]
    pub fn transaction(&self) -> Transaction {
        let id = self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed);
        Transaction::new(self.clone(), id)
    }

    /// A transaction that has already issued `BEGIN`.
    ///
    /// # Errors
    /// Returns the connection or `BEGIN` failure.
    pub async fn begin(&self) -> Result<Transaction> {
        let tx = self.transaction();
        tx.begin().await?;
        Ok(tx)
    }

    /// Run `body` in a fresh transaction: commit when it returns `Ok`, roll
    /// back when it returns `Err`.
    ///
    /// # Errors
    /// Returns the body's error, or the begin/commit/rollback failure.
    pub async fn atomic<F, Fut, T, E>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<OrmError>,
    {
        self.transaction().run(body).await
    }

    /// Same as [`atomic`](Self::atomic).
    ///
    /// # Errors
    /// Returns the body's error, or the begin/commit/rollback failure.
    pub async fn commit_on_success<F, Fut, T, E>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<OrmError>,
    {
        self.atomic(body).await
    }

    /// # Errors
    /// Returns the backend error from the catalog query.
    pub async fn get_tables(&self, schema: Option<&str>) -> Result<Vec<String>> {
        Target::from(self).get_tables(schema).await
    }

    /// # Errors
    /// Returns the backend error from the catalog query.
    pub async fn table_exists(&self, table: &str, schema: Option<&str>) -> Result<bool> {
        Target::from(self).table_exists(table, schema).await
    }

    /// Create tables parents-first so foreign keys resolve.
    ///
    /// # Errors
    /// Stops at, and returns, the first DDL failure.
    pub async fn create_tables(&self, models: &[&'static ModelMeta], safe: bool) -> Result<()> {
        let target = Target::from(self);
        for meta in crate::model::sort_models(models) {
            schema::create_table(&target, meta, safe).await?;
        }
        Ok(())
    }

    /// Drop tables children-first.
    ///
    /// # Errors
    /// Stops at, and returns, the first DDL failure.
    pub async fn drop_tables(&self, models: &[&'static ModelMeta], safe: bool) -> Result<()> {
        let target = Target::from(self);
        for meta in crate::model::sort_models(models).into_iter().rev() {
            schema::drop_table(&target, meta, safe, false).await?;
        }
        Ok(())
    }

    /// Hand-written SQL with `?` placeholders, yielding dict-shaped rows.
    #[must_use]
    pub fn raw(&self, sql: impl Into<String>, params: Vec<RowValues>) -> DeferredSelect<CustomDbRow> {
        DeferredSelect::raw(RawQuery::new(sql, params), "raw query").with_target(Target::from(self))
    }
}

async fn run_statement(
    conn: &mut MiddlewarePoolConnection,
    sql: &str,
    params: &[RowValues],
    commit: bool,
    autorollback: bool,
) -> Result<Cursor> {
    if !commit {
        return conn.execute(sql, params).await;
    }
    conn.begin().await?;
    match conn.execute(sql, params).await {
        Ok(cursor) => {
            conn.commit().await?;
            Ok(cursor)
        }
        Err(err) => {
            if autorollback {
                if let Err(rollback_err) = conn.rollback().await {
                    warn!(error = %rollback_err, "autorollback failed");
                }
            }
            // Without a rollback the connection stays mid-transaction and the
            // pool discards it on release.
            Err(err)
        }
    }
}

#[async_trait]
impl Executor for Database {
    async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
        policy: CommitPolicy,
    ) -> Result<Cursor> {
        Database::execute_sql(self, sql, params, policy).await
    }

    fn database(&self) -> &Database {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_skips_commit_for_reads_only() {
        assert!(!CommitPolicy::Infer.should_commit("  select 1", false));
        assert!(!CommitPolicy::Infer.should_commit("(SELECT 1) UNION (SELECT 2)", false));
        assert!(CommitPolicy::Infer.should_commit("SELECT 1", true));
        assert!(CommitPolicy::Infer.should_commit("INSERT INTO t VALUES (1)", false));
        assert!(CommitPolicy::Infer.should_commit("sel", false));
        assert!(CommitPolicy::Always.should_commit("SELECT 1", false));
        assert!(!CommitPolicy::Never.should_commit("DELETE FROM t", false));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn deferred_database_guards_lifecycle() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let db = Database::deferred(DatabaseType::Sqlite);
        assert!(matches!(db.connect().await, Err(OrmError::Configuration(_))));
        assert!(matches!(db.close().await, Err(OrmError::State(_))));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deferred.db");
        db.init(DatabaseConfig::sqlite(SqliteOptions::new(path.to_string_lossy())))
            .await?;
        db.connect().await?;
        assert!(!db.is_closed().await);
        db.close().await?;
        db.close().await?;
        assert!(db.is_closed().await);
        Ok(())
    }

    #[cfg(feature = "postgres")]
    #[tokio::test]
    async fn init_rejects_other_backend() {
        let db = Database::deferred(DatabaseType::Sqlite);
        let err = db
            .init(DatabaseConfig::postgres(PostgresOptions::new("app", "app")))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }
}
