#![allow(clippy::result_large_err)]

//! Networked engine: PostgreSQL through the synchronous `postgres` client.
//!
//! A Database owns a bounded connection pool; autocommit operations acquire
//! and release a connection per call, while a transaction holds one for its
//! whole scope. A lazily-populated schema cache drives identifier casing
//! resolution, parameter casts, and `RETURNING` primary keys.

mod config;
mod database;
mod pool;
mod transaction;
mod values;

pub use config::{ConnectOptions, parse_descriptor};
pub use database::{POSTGRES_DIALECT, PostgresDatabase, PostgresDialect};
pub use transaction::PostgresTransaction;
