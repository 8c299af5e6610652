//! Deferred execution handles over the query builders.
//!
//! A builder renders SQL; a handle owns a builder plus the target it runs
//! against, triggers the round trip on first use, and caches the outcome.
//! The two are separate types so caching can be reasoned about without SQL.

mod cache;
mod insert;
mod mutation;
mod row;
mod select;

pub use cache::RowCache;
pub use insert::{DeferredInsert, InsertResult, PrimaryKey};
pub use mutation::{DeferredMutation, MutationQuery};
pub use row::{Bind, FromRow};
pub use select::DeferredSelect;

use crate::error::{OrmError, Result};
use crate::executor::Target;

/// The bound target, or the configuration error every handle reports when
/// asked to run without one.
fn require_target(target: Option<&Target>, what: &str) -> Result<Target> {
    target.cloned().ok_or_else(|| {
        OrmError::Configuration(format!(
            "{what} has no database or transaction bound; call bind() or give the model a default database"
        ))
    })
}
