//! Async execution and transaction binding for a query builder, over
//! pooled tokio-postgres and rusqlite connections.
//!
//! Queries are built synchronously and run when awaited. Each handle runs
//! against an explicit [`Database`] or [`Transaction`]; nothing is bound
//! through ambient state.
//!
//! ```rust,no_run
//! use sql_async_orm::prelude::*;
//!
//! # async fn demo() -> Result<(), OrmError> {
//! let db = Database::sqlite(SqliteOptions::new("app.db"));
//! db.execute_sql(
//!     "CREATE TABLE IF NOT EXISTS item (id INTEGER PRIMARY KEY, data TEXT)",
//!     &[],
//!     CommitPolicy::Always,
//! )
//! .await?;
//!
//! db.atomic(|tx| async move {
//!     tx.execute_sql("INSERT INTO item (data) VALUES (?1)", &["a".into()], CommitPolicy::Never)
//!         .await?;
//!     Ok::<_, OrmError>(())
//! })
//! .await?;
//!
//! let count = db.raw("SELECT id FROM item", vec![]).count().await?;
//! assert_eq!(count, 1);
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod model;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use database::{CommitPolicy, Database, DatabaseConfig};
pub use error::OrmError;
pub use executor::{Executor, Target};
pub use transaction::{Transaction, TransactionStatus};
pub use types::{Capabilities, DatabaseType, RowValues};
