//! Connection pooling over bb8, one pool variant per backend.

mod adapter;
mod connection;
mod types;

pub use adapter::{BackendSettings, PoolAdapter};
pub use connection::MiddlewarePoolConnection;
pub use types::MiddlewarePool;
