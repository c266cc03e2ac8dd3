//! PostgreSQL persistence module.
//!
//! Provides the connection pool and schema migrations for the PostgreSQL
//! storage backend.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
