use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::database::{CommitPolicy, Database};
use crate::error::{OrmError, Result};
use crate::executor::Executor;
use crate::pool::MiddlewarePoolConnection;
use crate::results::Cursor;
use crate::types::RowValues;

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Unopened,
    Open,
    Committed,
    RolledBack,
    Closed,
}

enum TxState {
    Unopened,
    Open(MiddlewarePoolConnection),
    Committed,
    RolledBack,
    Closed,
}

impl TxState {
    fn status(&self) -> TransactionStatus {
        match self {
            TxState::Unopened => TransactionStatus::Unopened,
            TxState::Open(_) => TransactionStatus::Open,
            TxState::Committed => TransactionStatus::Committed,
            TxState::RolledBack => TransactionStatus::RolledBack,
            TxState::Closed => TransactionStatus::Closed,
        }
    }
}

#[derive(Clone, Copy)]
enum Finish {
    Commit,
    Rollback,
}

struct TransactionInner {
    id: u64,
    database: Database,
    state: Mutex<TxState>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), TxState::Closed);
        let TxState::Open(mut conn) = state else {
            return;
        };
        warn!(tx = self.id, "transaction dropped while open; rolling back");
        // Without a runtime the connection is simply discarded, which the
        // server treats as a rollback.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let id = self.id;
            handle.spawn(async move {
                if let Err(e) = conn.rollback().await {
                    warn!(tx = id, error = %e, "rollback of dropped transaction failed");
                }
            });
        }
    }
}

/// One pooled connection held from `BEGIN` until commit or rollback.
///
/// Clones share the same transaction. Statements run strictly one at a
/// time: a second flow driving the same transaction while a statement is in
/// flight gets [`OrmError::ConcurrentTransactionUse`] instead of waiting.
///
/// ```rust,no_run
/// use sql_async_orm::prelude::*;
///
/// # async fn demo(db: Database) -> Result<(), OrmError> {
/// let tx = db.transaction();
/// tx.scope(|tx| async move {
///     tx.execute_sql("INSERT INTO note (body) VALUES (?1)", &["hi".into()], CommitPolicy::Never)
///         .await?;
///     Ok::<_, OrmError>(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(database: Database, id: u64) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id,
                database,
                state: Mutex::new(TxState::Unopened),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub async fn status(&self) -> TransactionStatus {
        self.inner.state.lock().await.status()
    }

    fn claim(&self) -> Result<MutexGuard<'_, TxState>> {
        self.inner
            .state
            .try_lock()
            .map_err(|_| OrmError::ConcurrentTransactionUse(self.inner.id))
    }

    async fn open(&self, state: &mut TxState) -> Result<()> {
        match state {
            TxState::Unopened => {}
            TxState::Open(_) => {
                return Err(OrmError::Transaction(format!(
                    "transaction {} is already open",
                    self.inner.id
                )));
            }
            _ => return Err(self.finished_error()),
        }
        let mut conn = self.inner.database.acquire().await?;
        // On failure the connection is dropped and the pool discards it.
        conn.begin().await?;
        debug!(tx = self.inner.id, "transaction begun");
        *state = TxState::Open(conn);
        Ok(())
    }

    fn finished_error(&self) -> OrmError {
        OrmError::Transaction(format!(
            "transaction {} has already finished; start a new one",
            self.inner.id
        ))
    }

    /// Acquire a dedicated connection and issue `BEGIN`.
    ///
    /// # Errors
    /// `OrmError::Transaction` when already open or finished;
    /// `OrmError::ConcurrentTransactionUse` when another flow is using it.
    pub async fn begin(&self) -> Result<()> {
        let mut state = self.claim()?;
        self.open(&mut state).await
    }

    /// Run a statement on the held connection, beginning first if needed.
    /// The commit policy does not apply: the transaction decides when to commit.
    ///
    /// # Errors
    /// The statement error, `OrmError::Transaction` after the transaction
    /// finished, or `OrmError::ConcurrentTransactionUse`.
    pub async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
        _policy: CommitPolicy,
    ) -> Result<Cursor> {
        let mut state = self.claim()?;
        if matches!(*state, TxState::Unopened) {
            self.open(&mut state).await?;
        }
        match &mut *state {
            TxState::Open(conn) => {
                debug!(tx = self.inner.id, sql, params = params.len(), "executing statement");
                conn.execute(sql, params).await
            }
            _ => Err(self.finished_error()),
        }
    }

    async fn finish(&self, how: Finish) -> Result<()> {
        let mut state = self.claim()?;
        let mut conn = match std::mem::replace(&mut *state, TxState::Closed) {
            TxState::Open(conn) => conn,
            TxState::Unopened => {
                *state = TxState::Unopened;
                return Err(OrmError::Transaction(format!(
                    "transaction {} has not begun",
                    self.inner.id
                )));
            }
            finished => {
                *state = finished;
                return Err(self.finished_error());
            }
        };
        let (result, outcome) = match how {
            Finish::Commit => match conn.commit().await {
                Ok(()) => (Ok(()), TxState::Committed),
                Err(e) => {
                    warn!(tx = self.inner.id, error = %e, "commit failed; rolling back");
                    let after = match conn.rollback().await {
                        Ok(()) => TxState::RolledBack,
                        Err(rb) => {
                            warn!(tx = self.inner.id, error = %rb, "rollback after failed commit failed");
                            TxState::Closed
                        }
                    };
                    (Err(e), after)
                }
            },
            Finish::Rollback => match conn.rollback().await {
                Ok(()) => (Ok(()), TxState::RolledBack),
                Err(e) => (Err(e), TxState::Closed),
            },
        };
        // Released whatever happened; a connection still mid-transaction is discarded.
        self.inner.database.release(conn);
        *state = outcome;
        if result.is_ok() {
            debug!(
                tx = self.inner.id,
                outcome = if matches!(how, Finish::Commit) { "commit" } else { "rollback" },
                "transaction finished"
            );
        }
        result
    }

    /// Commit and release the connection.
    ///
    /// # Errors
    /// `OrmError::Transaction` before `begin` or after finishing, or the
    /// `COMMIT` failure (the connection is released either way).
    pub async fn commit(&self) -> Result<()> {
        self.finish(Finish::Commit).await
    }

    /// Roll back and release the connection.
    ///
    /// # Errors
    /// `OrmError::Transaction` before `begin` or after finishing, or the
    /// `ROLLBACK` failure (the connection is released either way).
    pub async fn rollback(&self) -> Result<()> {
        self.finish(Finish::Rollback).await
    }

    /// Release the connection without resolving. Idempotent.
    ///
    /// # Errors
    /// `OrmError::ConcurrentTransactionUse` while a statement is in flight.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.claim()?;
        match std::mem::replace(&mut *state, TxState::Closed) {
            TxState::Open(conn) => {
                debug!(tx = self.inner.id, "transaction closed while open");
                self.inner.database.release(conn);
            }
            // Keep the terminal outcome visible.
            finished @ (TxState::Committed | TxState::RolledBack) => *state = finished,
            TxState::Unopened | TxState::Closed => {}
        }
        Ok(())
    }

    /// Scoped use: run `body`, then commit on `Ok` or roll back on `Err`.
    ///
    /// The body's error is returned unless the rollback itself fails, in
    /// which case the rollback error wins. A failed commit is rolled back
    /// and its error returned. A body that never ran a statement leaves
    /// nothing to resolve.
    ///
    /// # Errors
    /// See above.
    pub async fn scope<F, Fut, T, E>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<OrmError>,
    {
        let outcome = body(self.clone()).await;
        if self.status().await != TransactionStatus::Open {
            return outcome;
        }
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                self.rollback().await?;
                Err(err)
            }
        }
    }

    /// Unit-of-work form: begin eagerly, hand the transaction to `body`, then
    /// resolve as [`scope`](Self::scope) does.
    ///
    /// # Errors
    /// The `BEGIN` failure, or as for [`scope`](Self::scope).
    pub async fn run<F, Fut, T, E>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<OrmError>,
    {
        self.begin().await?;
        self.scope(body).await
    }
}

#[async_trait]
impl Executor for Transaction {
    async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
        policy: CommitPolicy,
    ) -> Result<Cursor> {
        Transaction::execute_sql(self, sql, params, policy).await
    }

    fn database(&self) -> &Database {
        &self.inner.database
    }
}
