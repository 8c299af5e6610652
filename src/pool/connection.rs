#[cfg(feature = "sqlite")]
use std::sync::Arc;

use bb8::PooledConnection;

use crate::error::Result;
#[cfg(feature = "postgres")]
use crate::postgres::{self, PgManager};
use crate::results::Cursor;
#[cfg(feature = "sqlite")]
use crate::sqlite::{self, SqliteManager};
use crate::types::{DatabaseType, RowValues};

/// A connection checked out of a [`MiddlewarePool`](super::MiddlewarePool).
///
/// Dropping it hands it back to the pool. A connection dropped while a
/// transaction is still open is discarded instead of reused.
pub enum MiddlewarePoolConnection {
    #[cfg(feature = "postgres")]
    Postgres(PooledConnection<'static, PgManager>),
    #[cfg(feature = "sqlite")]
    Sqlite(PooledConnection<'static, SqliteManager>),
}

impl std::fmt::Debug for MiddlewarePoolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => f.debug_tuple("Postgres").field(&**conn).finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => f.debug_tuple("Sqlite").finish(),
        }
    }
}

impl MiddlewarePoolConnection {
    #[must_use]
    pub fn db_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => DatabaseType::Sqlite,
        }
    }

    /// Execute one parameterized statement.
    ///
    /// # Errors
    /// Returns the classified backend error.
    pub async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<Cursor> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => postgres::query::execute(&conn.client, sql, params).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => sqlite::query::execute(Arc::clone(&**conn), sql, params).await,
        }
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => postgres::query::batch_execute(&conn.client, sql).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => sqlite::query::batch_execute(Arc::clone(&**conn), sql).await,
        }
    }

    /// Open a transaction on this connection.
    ///
    /// # Errors
    /// Returns the backend error if `BEGIN` is rejected.
    pub async fn begin(&mut self) -> Result<()> {
        // Flag first: if this future is dropped mid-BEGIN the pool must not reuse us.
        self.set_in_transaction(true);
        self.batch_execute("BEGIN").await
    }

    /// # Errors
    /// Returns the backend error if `COMMIT` is rejected. The connection then
    /// still counts as mid-transaction and will not be reused.
    pub async fn commit(&mut self) -> Result<()> {
        self.batch_execute("COMMIT").await?;
        self.set_in_transaction(false);
        Ok(())
    }

    /// # Errors
    /// Returns the backend error if `ROLLBACK` is rejected.
    pub async fn rollback(&mut self) -> Result<()> {
        self.batch_execute("ROLLBACK").await?;
        self.set_in_transaction(false);
        Ok(())
    }

    #[allow(unused_variables)]
    fn set_in_transaction(&mut self, open: bool) {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => conn.in_transaction = open,
            // SQLite reports this itself through autocommit mode.
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => {}
        }
    }
}
