use std::future::Future;

use bb8::ManageConnection;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

/// A pooled client plus the transaction flag the pool checks on return.
pub struct PgClient {
    pub(crate) client: Client,
    pub(crate) in_transaction: bool,
}

impl std::fmt::Debug for PgClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgClient")
            .field("closed", &self.client.is_closed())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

/// bb8 manager for Postgres clients.
pub struct PgManager {
    pub(crate) config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }
}

impl ManageConnection for PgManager {
    type Connection = PgClient;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            debug!(hosts = ?cfg.get_hosts(), db = ?cfg.get_dbname(), "opening postgres connection");
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "postgres connection task ended with error");
                }
            });
            Ok(PgClient {
                client,
                in_transaction: false,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.client.simple_query("SELECT 1").await.map(|_| ()) }
    }

    // A client handed back mid-transaction cannot be reused safely.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.client.is_closed() || conn.in_transaction
    }
}
