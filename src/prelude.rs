//! Convenient imports for common functionality.
//!
//! Brings the database handle, the model traits, query helpers and the
//! error type into scope. The crate's `Result` alias is left out so it does
//! not shadow `std::result::Result`.

pub use crate::database::{CommitPolicy, Database, DatabaseConfig};
pub use crate::deferred::{
    Bind, DeferredInsert, DeferredMutation, DeferredSelect, FromRow, InsertResult, PrimaryKey,
    RowCache,
};
pub use crate::error::OrmError;
pub use crate::executor::{Executor, Target};
pub use crate::model::{
    DeleteOptions, FieldMeta, FieldType, ForeignKey, IndexMeta, Model, ModelExt, ModelMeta,
    ModelState, SaveOptions, Using,
};
pub use crate::pool::BackendSettings;
pub use crate::query::{Expr, SelectQuery, SqlQuery, col, func, sql, val};
pub use crate::results::{Cursor, CustomDbRow, ResultSet};
pub use crate::transaction::{Transaction, TransactionStatus};
pub use crate::types::{Capabilities, DatabaseType, FromValue, RowValues};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresOptions;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteOptions;
