use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::connection::MiddlewarePoolConnection;
use super::types::MiddlewarePool;
use crate::error::{OrmError, Result};
#[cfg(feature = "postgres")]
use crate::postgres::PostgresOptions;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteOptions;
use crate::types::DatabaseType;

/// Backend-specific connection settings, tagged by backend in config files.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendSettings {
    #[cfg(feature = "postgres")]
    Postgres(PostgresOptions),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteOptions),
}

impl BackendSettings {
    #[must_use]
    pub fn db_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "postgres")]
            BackendSettings::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "sqlite")]
            BackendSettings::Sqlite(_) => DatabaseType::Sqlite,
        }
    }
}

#[derive(Default)]
struct PoolState {
    settings: Option<BackendSettings>,
    pool: Option<MiddlewarePool>,
}

/// Owns the lifecycle of one lazily-created pool.
///
/// The pool is built on first use, torn down by [`close`](Self::close) and
/// rebuilt by the next [`acquire`](Self::acquire).
pub struct PoolAdapter {
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for PoolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAdapter").finish_non_exhaustive()
    }
}

impl PoolAdapter {
    /// An adapter with no settings yet; every operation fails until
    /// [`configure`](Self::configure) is called.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
        }
    }

    #[must_use]
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            state: Mutex::new(PoolState {
                settings: Some(settings),
                pool: None,
            }),
        }
    }

    /// Install settings on an unconfigured or closed adapter.
    ///
    /// # Errors
    /// Returns `OrmError::State` while a pool built from older settings is still open.
    pub async fn configure(&self, settings: BackendSettings) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.pool.is_some() {
            return Err(OrmError::State(
                "close the pool before installing new settings".into(),
            ));
        }
        state.settings = Some(settings);
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.pool.is_none()
    }

    async fn ensure_pool(state: &mut PoolState) -> Result<MiddlewarePool> {
        if let Some(pool) = &state.pool {
            return Ok(pool.clone());
        }
        let Some(settings) = &state.settings else {
            return Err(OrmError::Configuration(
                "database has not been initialized".into(),
            ));
        };
        let pool = MiddlewarePool::build(settings).await?;
        info!(backend = ?settings.db_type(), "connection pool created");
        state.pool = Some(pool.clone());
        Ok(pool)
    }

    /// Create the pool if it does not exist yet. Idempotent.
    ///
    /// # Errors
    /// Returns `OrmError::Configuration` when no settings were provided, or the
    /// pool construction error.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::ensure_pool(&mut state).await.map(|_| ())
    }

    /// Check out a connection, creating the pool on first use.
    ///
    /// # Errors
    /// Returns `OrmError::Configuration` when no settings were provided, or a
    /// connection error from the pool.
    pub async fn acquire(&self) -> Result<MiddlewarePoolConnection> {
        let pool = {
            let mut state = self.state.lock().await;
            Self::ensure_pool(&mut state).await?
        };
        let conn = pool.get_connection().await?;
        debug!(backend = ?conn.db_type(), "connection acquired");
        Ok(conn)
    }

    /// Hand a connection back to its pool.
    ///
    /// Taking ownership makes a second release of the same handle impossible.
    pub fn release(&self, conn: MiddlewarePoolConnection) {
        debug!(backend = ?conn.db_type(), "connection released");
        drop(conn);
    }

    /// Drop the pool. Connections still checked out close as they are returned.
    /// Returns whether a pool was actually torn down.
    ///
    /// # Errors
    /// Returns `OrmError::State` when the adapter was never configured.
    pub async fn close(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.settings.is_none() {
            return Err(OrmError::State(
                "cannot close a database that was never initialized".into(),
            ));
        }
        let closed = state.pool.take().is_some();
        if closed {
            info!("connection pool closed");
        }
        Ok(closed)
    }
}
