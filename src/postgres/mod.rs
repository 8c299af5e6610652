//! `PostgreSQL` driver shim: options, the bb8 connection manager, parameter
//! binding and row extraction.

pub mod config;
pub(crate) mod manager;
pub(crate) mod params;
pub(crate) mod query;

pub use config::{PostgresOptions, PostgresOptionsBuilder};
pub use manager::{PgClient, PgManager};
