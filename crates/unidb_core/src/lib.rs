#![allow(clippy::result_large_err)]

mod argument;
mod assemble;
mod cursor;
mod dialect;
mod error;
mod queryable;
mod record;
pub mod registry;
mod row;
mod transaction;
mod value;

pub use argument::{
    Clause, CmpOp, ColumnRef, Columns, Direction, Filter, Group, Limit, Order, Params, Query,
    Target, Values,
};
pub use assemble::{
    ColumnResolver, NoResolver, Statement, assemble_delete, assemble_insert, assemble_select,
    assemble_update,
};
pub use cursor::{BufferedCursor, ColumnDesc, Cursor, Rows};
pub use dialect::{AnsiDialect, Dialect, EngineKind, PlaceholderStyle, is_reserved_word};
pub use error::{DbError, DriverFailure, Result};
pub use queryable::Queryable;
pub use record::{Col, Record};
pub use registry::{
    RowFactory, register_adapter, register_converter, register_row_factory,
};
pub use row::Row;
pub use transaction::TxOptions;
pub use value::Value;

pub use chrono;
