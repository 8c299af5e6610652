use std::time::Duration;

use serde::Deserialize;

use crate::error::{OrmError, Result};

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    32
}

/// Connection options for a `PostgreSQL` database.
///
/// Deserializes from the same shape a deployment would keep in a config file:
/// ```rust
/// use sql_async_orm::postgres::PostgresOptions;
///
/// let opts: PostgresOptions = serde_json::from_str(
///     r#"{"dbname": "app", "user": "app", "password": "secret", "max_connections": 8}"#,
/// ).unwrap();
/// assert_eq!(opts.port, 5432);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Idle connections older than this are closed by the pool.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// How long `acquire` waits for a free connection. `None` waits indefinitely.
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

impl PostgresOptions {
    #[must_use]
    pub fn new(dbname: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: dbname.into(),
            user: user.into(),
            password: None,
            max_connections: default_max_connections(),
            idle_timeout_secs: None,
            acquire_timeout_secs: None,
        }
    }

    #[must_use]
    pub fn builder(dbname: impl Into<String>, user: impl Into<String>) -> PostgresOptionsBuilder {
        PostgresOptionsBuilder {
            opts: Self::new(dbname, user),
        }
    }

    /// Translate into a driver configuration.
    ///
    /// # Errors
    /// Returns `OrmError::Configuration` when a required field is empty.
    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config> {
        if self.dbname.is_empty() {
            return Err(OrmError::Configuration("dbname is required".into()));
        }
        if self.user.is_empty() {
            return Err(OrmError::Configuration("user is required".into()));
        }
        if self.max_connections == 0 {
            return Err(OrmError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user);
        if let Some(password) = &self.password {
            cfg.password(password);
        }
        Ok(cfg)
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub(crate) fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }
}

/// Fluent builder for [`PostgresOptions`].
#[derive(Debug, Clone)]
pub struct PostgresOptionsBuilder {
    opts: PostgresOptions,
}

impl PostgresOptionsBuilder {
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.opts.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.opts.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.opts.max_connections = max;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.opts.idle_timeout_secs = Some(timeout.as_secs());
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.opts.acquire_timeout_secs = Some(timeout.as_secs());
        self
    }

    #[must_use]
    pub fn finish(self) -> PostgresOptions {
        self.opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dbname_is_a_configuration_error() {
        let opts = PostgresOptions::new("", "app");
        assert!(matches!(
            opts.to_pg_config(),
            Err(OrmError::Configuration(_))
        ));
    }

    #[test]
    fn builder_overrides_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let opts = PostgresOptions::builder("app", "svc")
            .host("db.internal")
            .port(6543)
            .max_connections(4)
            .finish();
        let cfg = opts.to_pg_config()?;
        assert_eq!(cfg.get_ports(), &[6543]);
        assert_eq!(cfg.get_dbname(), Some("app"));
        assert_eq!(opts.max_connections, 4);
        Ok(())
    }
}
