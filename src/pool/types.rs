use std::time::Duration;

use bb8::{AddError, ManageConnection, Pool, PooledConnection};
use tracing::debug;

use super::adapter::BackendSettings;
use super::connection::MiddlewarePoolConnection;
use crate::error::{OrmError, Result};
#[cfg(feature = "postgres")]
use crate::postgres::PgManager;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteManager;

/// bb8 insists on a checkout deadline; this stands in for "wait until one frees up".
/// Growth goes through [`checkout`], so a failed connect never waits this out.
const UNBOUNDED_ACQUIRE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Connection pool for database access.
///
/// Cloning is cheap; clones share the same underlying pool.
#[derive(Clone)]
pub enum MiddlewarePool {
    #[cfg(feature = "postgres")]
    Postgres { pool: Pool<PgManager>, max_size: u32 },
    #[cfg(feature = "sqlite")]
    Sqlite { pool: Pool<SqliteManager>, max_size: u32 },
}

impl std::fmt::Debug for MiddlewarePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres { pool, max_size } => f
                .debug_struct("Postgres")
                .field("state", &pool.state())
                .field("max_size", max_size)
                .finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite { pool, max_size } => f
                .debug_struct("Sqlite")
                .field("state", &pool.state())
                .field("max_size", max_size)
                .finish(),
        }
    }
}

/// Check a connection out of `pool`, opening it here when the pool has to grow.
///
/// bb8 hands connect failures from its own background growth to the error
/// sink and leaves the waiter parked until `connection_timeout`. Connecting
/// in the caller's task instead surfaces the failure to that caller.
async fn checkout<M>(pool: &Pool<M>, max_size: u32) -> Result<PooledConnection<'static, M>>
where
    M: ManageConnection,
    M::Error: std::fmt::Display,
{
    let state = pool.state();
    if state.idle_connections == 0 && state.connections < max_size {
        let conn = pool
            .dedicated_connection()
            .await
            .map_err(|e| OrmError::Connection(format!("could not open a connection: {e}")))?;
        match pool.add(conn) {
            Ok(()) => {}
            // Another checkout filled the pool first; ours is surplus.
            Err(AddError::NoCapacity(_)) => debug!("pool filled concurrently; dropping extra connection"),
            Err(AddError::Broken(_)) => debug!("fresh connection reported broken; dropping it"),
        }
    }
    Ok(pool.get_owned().await?)
}

impl MiddlewarePool {
    /// Build a pool for the given backend. No connection is opened yet.
    ///
    /// # Errors
    /// Returns `OrmError::Configuration` for invalid options or a backend this
    /// build was compiled without.
    #[allow(unreachable_patterns)]
    pub async fn build(settings: &BackendSettings) -> Result<Self> {
        match settings {
            #[cfg(feature = "postgres")]
            BackendSettings::Postgres(opts) => {
                let manager = PgManager::new(opts.to_pg_config()?);
                let pool = Pool::builder()
                    .max_size(opts.max_connections)
                    .idle_timeout(opts.idle_timeout())
                    .connection_timeout(opts.acquire_timeout().unwrap_or(UNBOUNDED_ACQUIRE))
                    .retry_connection(false)
                    .build(manager)
                    .await
                    .map_err(|e| OrmError::Connection(format!("postgres pool error: {e}")))?;
                Ok(MiddlewarePool::Postgres {
                    pool,
                    max_size: opts.max_connections,
                })
            }
            #[cfg(feature = "sqlite")]
            BackendSettings::Sqlite(opts) => {
                opts.validate()?;
                let pool = Pool::builder()
                    .max_size(opts.max_connections)
                    .idle_timeout(opts.idle_timeout())
                    .connection_timeout(opts.acquire_timeout().unwrap_or(UNBOUNDED_ACQUIRE))
                    .retry_connection(false)
                    .build(SqliteManager::new(opts.clone()))
                    .await?;
                Ok(MiddlewarePool::Sqlite {
                    pool,
                    max_size: opts.max_connections,
                })
            }
            _ => Err(OrmError::Configuration(format!(
                "backend {:?} is not enabled in this build",
                settings.db_type()
            ))),
        }
    }

    /// Check out a connection, waiting for one to free up when the pool is at capacity.
    ///
    /// # Errors
    /// Returns `OrmError::Connection` if no connection could be established.
    pub async fn get_connection(&self) -> Result<MiddlewarePoolConnection> {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePool::Postgres { pool, max_size } => {
                Ok(MiddlewarePoolConnection::Postgres(checkout(pool, *max_size).await?))
            }
            #[cfg(feature = "sqlite")]
            MiddlewarePool::Sqlite { pool, max_size } => {
                Ok(MiddlewarePoolConnection::Sqlite(checkout(pool, *max_size).await?))
            }
        }
    }
}
