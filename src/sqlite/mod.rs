//! `SQLite` driver shim. Connections are blocking, so every call is moved
//! onto the blocking pool and serialized through a per-connection mutex.

pub mod config;
pub(crate) mod manager;
pub(crate) mod params;
pub(crate) mod query;

pub use config::{SqliteOptions, SqliteOptionsBuilder};
pub use manager::{SharedSqliteConnection, SqliteManager};
