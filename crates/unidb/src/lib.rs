#![allow(clippy::result_large_err)]

//! Uniform structured-query facade over SQLite and PostgreSQL.
//!
//! Callers phrase SELECT / INSERT / UPDATE / DELETE through structured
//! arguments — table names or record types, value pairs, filter clauses,
//! ordering, grouping, limits — and get backend-correct parameterized SQL,
//! bound execution, and mapping-shaped rows or record instances back.
//!
//! ```no_run
//! use unidb::{Query, Queryable};
//!
//! # fn main() -> unidb::Result<()> {
//! let db = unidb::open("sqlite", ":memory:")?;
//! db.executescript("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)")?;
//! db.insert("t", ("val", "a"))?;
//! let rows = db.fetchall("t", Query::new().order_by("id"))?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

mod database;
mod engines;

pub use database::{Database, Transaction};
pub use engines::{Engine, OpenOptions, engine, init, init_engine, open, open_with,
    register_engine, reset_defaults};

pub use unidb_core::{
    Clause, CmpOp, Col, ColumnDesc, ColumnRef, ColumnResolver, Columns, Cursor, DbError, Dialect,
    Direction, DriverFailure, EngineKind, Filter, Group, Limit, Order, Params, PlaceholderStyle,
    Query, Queryable, Record, Result, Row, RowFactory, Rows, Statement, Target, TxOptions, Value,
    Values, register_adapter, register_converter, register_row_factory, registry,
};

pub use unidb_engine_postgres::{ConnectOptions, PostgresDatabase, PostgresTransaction};
pub use unidb_engine_sqlite::{SqliteDatabase, SqliteTransaction};
