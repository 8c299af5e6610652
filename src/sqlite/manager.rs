use std::future::Future;
use std::sync::Arc;

use bb8::ManageConnection;
use tokio::sync::Mutex;
use tracing::debug;

use super::config::SqliteOptions;
use crate::error::{OrmError, Result};

/// A pooled `SQLite` handle. The mutex serializes blocking calls on it.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// bb8 manager for `SQLite` connections.
pub struct SqliteManager {
    opts: SqliteOptions,
}

impl SqliteManager {
    #[must_use]
    pub fn new(opts: SqliteOptions) -> Self {
        Self { opts }
    }
}

fn open(opts: &SqliteOptions) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(&opts.db_path)?;
    conn.busy_timeout(opts.busy_timeout())?;
    if opts.wal && !opts.is_memory() {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| OrmError::execution(format!("sqlite spawn_blocking join error: {e}")))?
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = OrmError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection>> + Send {
        let opts = self.opts.clone();
        async move {
            debug!(path = %opts.db_path, "opening sqlite connection");
            let conn = tokio::task::spawn_blocking(move || open(&opts))
                .await
                .map_err(|e| OrmError::Connection(format!("sqlite open join error: {e}")))??;
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(&self, conn: &mut Self::Connection) -> impl Future<Output = Result<()>> + Send {
        let handle = Arc::clone(conn);
        async move {
            run_blocking(handle, |c| {
                c.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
        }
    }

    // Busy or still inside BEGIN means someone abandoned it mid-flight.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.try_lock().map_or(true, |c| !c.is_autocommit())
    }
}
