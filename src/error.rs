use thiserror::Error;

use crate::types::RowValues;

/// Every failure surfaced by this crate.
///
/// Driver errors are classified on conversion so callers can branch on the
/// taxonomy instead of on backend-specific error shapes:
/// ```rust
/// use sql_async_orm::prelude::*;
///
/// fn is_race(err: &OrmError) -> bool {
///     matches!(err, OrmError::IntegrityViolation { .. })
/// }
/// # let _ = is_race;
/// ```
#[derive(Debug, Error)]
pub enum OrmError {
    /// Pool or database used before the required setup happened.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation not allowed in the database's current lifecycle state.
    #[error("State error: {0}")]
    State(String),

    /// Failure acquiring or establishing a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement rejected by the backend.
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        /// Native error code (SQLSTATE for Postgres, extended result code for SQLite).
        code: Option<String>,
    },

    /// Uniqueness or foreign-key constraint violation.
    #[error("Integrity violation: {message}")]
    IntegrityViolation {
        message: String,
        code: Option<String>,
    },

    /// A lookup that requires a row found none.
    #[error("{model} instance matching query does not exist:\nSQL: {sql}\nParams: {params:?}")]
    RecordNotFound {
        model: &'static str,
        sql: String,
        params: Vec<RowValues>,
    },

    /// Invalid transaction state transition.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The same transaction was driven from two overlapping logical flows.
    #[error("Transaction {0} is already in use by another operation")]
    ConcurrentTransactionUse(u64),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Rebinding or reconfiguring a query whose results are already cached.
    #[error("Query has already been executed: {0}")]
    AlreadyExecuted(String),

    #[error("Query has not been executed")]
    NotExecuted,

    /// A row could not be converted into the requested shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl OrmError {
    pub(crate) fn execution(message: impl Into<String>) -> Self {
        OrmError::QueryExecution {
            message: message.into(),
            code: None,
        }
    }

    /// True for errors a retry-on-race path is allowed to absorb.
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, OrmError::IntegrityViolation { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::RecordNotFound { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for OrmError {
    fn from(err: tokio_postgres::Error) -> Self {
        let Some(state) = err.code() else {
            if err.is_closed() {
                return OrmError::Connection(format!("postgres connection closed: {err}"));
            }
            return OrmError::execution(err.to_string());
        };
        let code = state.code().to_string();
        // Prefer the server's message over the generic "db error" display.
        let message = err
            .as_db_error()
            .map_or_else(|| err.to_string(), |db| db.message().to_string());
        if code.starts_with("23") {
            OrmError::IntegrityViolation {
                message,
                code: Some(code),
            }
        } else {
            OrmError::QueryExecution {
                message,
                code: Some(code),
            }
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for OrmError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.clone().unwrap_or_else(|| err.to_string());
                let code = Some(failure.extended_code.to_string());
                if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                    OrmError::IntegrityViolation { message, code }
                } else if failure.code == rusqlite::ErrorCode::CannotOpen {
                    OrmError::Connection(message)
                } else {
                    OrmError::QueryExecution { message, code }
                }
            }
            _ => OrmError::execution(err.to_string()),
        }
    }
}

impl<E: std::fmt::Display> From<bb8::RunError<E>> for OrmError {
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::User(e) => OrmError::Connection(format!("pool checkout error: {e}")),
            bb8::RunError::TimedOut => {
                OrmError::Connection("timed out waiting for a pooled connection".into())
            }
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[test]
    fn sqlite_constraint_failures_are_integrity_violations() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let err: OrmError = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err().into();
        assert!(err.is_integrity_violation(), "{err:?}");

        let err: OrmError = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err().into();
        assert!(matches!(err, OrmError::QueryExecution { .. }), "{err:?}");
    }
}
