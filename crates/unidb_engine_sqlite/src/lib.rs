#![allow(clippy::result_large_err)]

//! Embedded engine: SQLite through rusqlite.
//!
//! One connection per Database, shared by autocommit operations and
//! transactions alike; transactions serialize against each other through a
//! scope lock because the driver shares transaction state per connection.

mod database;
mod transaction;

pub use database::{OpenOptions, SqliteDatabase, SqliteDialect, SQLITE_DIALECT};
pub use transaction::SqliteTransaction;
