//! Query builders and the SQL compiler behind them.
//!
//! Builders are plain data: cloning one copies every clause, and rendering
//! never touches a connection. Execution lives in [`crate::deferred`].

mod compiler;
mod ddl;
mod expr;
mod raw;
mod select;
mod write;

pub use compiler::{SqlQuery, SqlWriter};
pub use ddl::{CreateIndex, CreateTable, DropTable, TruncateTable};
pub use expr::{BinaryOp, Expr, Ordering, col, func, sql, val};
pub use raw::RawQuery;
pub use select::{ReadQuery, SelectQuery, Source};
pub use write::{DeleteQuery, InsertQuery, UpdateQuery};
