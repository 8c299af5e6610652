use std::time::Duration;

use serde::Deserialize;

use crate::error::{OrmError, Result};

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_wal() -> bool {
    true
}

/// Options for configuring a `SQLite` pool.
///
/// Every pooled connection opens the same file. `":memory:"` gives each
/// connection its own private database, so prefer a file (or a shared-cache
/// URI) whenever more than one connection is allowed.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteOptions {
    pub db_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Milliseconds a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Switch file databases to write-ahead logging on connect.
    #[serde(default = "default_wal")]
    pub wal: bool,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            wal: default_wal(),
            idle_timeout_secs: None,
            acquire_timeout_secs: None,
        }
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder {
            opts: Self::new(db_path),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.db_path.is_empty() {
            return Err(OrmError::Configuration("db_path is required".into()));
        }
        if self.max_connections == 0 {
            return Err(OrmError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn is_memory(&self) -> bool {
        self.db_path == ":memory:"
    }

    pub(crate) fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub(crate) fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.opts.max_connections = max;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn wal(mut self, enabled: bool) -> Self {
        self.opts.wal = enabled;
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
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}
