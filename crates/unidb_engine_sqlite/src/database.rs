use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use rusqlite::Connection as RusqliteConnection;
use rusqlite::types::{ToSqlOutput, ValueRef};
use unidb_core::{
    BufferedCursor, ColumnDesc, DbError, Dialect, DriverFailure, EngineKind, Params,
    PlaceholderStyle, Queryable, Result, RowFactory, Rows, Statement, TxOptions, Value,
};

use crate::transaction::SqliteTransaction;

/// SQLite SQL dialect: `?` placeholders, no RETURNING, no bare OFFSET.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn bare_offset(&self) -> bool {
        false
    }
}

pub static SQLITE_DIALECT: SqliteDialect = SqliteDialect;

/// Open-time flags for the embedded engine.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Feed declared column types to the converter registry (default on).
    pub parse_decltypes: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            parse_decltypes: true,
        }
    }
}

/// Embedded Database: owns the sole connection and mints transactions.
pub struct SqliteDatabase {
    pub(crate) conn: Mutex<RusqliteConnection>,
    /// Serializes exclusive transaction scopes; the driver shares
    /// transaction state per connection.
    pub(crate) scope_lock: Mutex<()>,
    closed: AtomicBool,
    row_factory: RwLock<Option<RowFactory>>,
    parse_decltypes: bool,
    path: PathBuf,
}

impl SqliteDatabase {
    /// Open a database file, or `:memory:` for a transient database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = RusqliteConnection::open(&path)
            .map_err(|e| DbError::driver(format!("failed to open {}: {}", path.display(), e)))?;

        log::info!("opened sqlite database at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            scope_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            row_factory: RwLock::new(None),
            parse_decltypes: options.parse_decltypes,
            path,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the database closed. In-flight operations on other threads get
    /// `NotOpen` on their next call; the driver handle is released on drop.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::info!("closed sqlite database at {}", self.path.display());
        }
    }

    /// Install a per-Database row factory, overriding the process-wide one.
    pub fn set_row_factory(
        &self,
        factory: impl Fn(Vec<(String, Value)>) -> unidb_core::Row + Send + Sync + 'static,
    ) {
        *self.row_factory.write().expect("row factory lock poisoned") =
            Some(std::sync::Arc::new(factory));
    }

    /// Begin a transaction scope with default options (exclusive, commit).
    pub fn begin(&self) -> Result<SqliteTransaction<'_>> {
        self.begin_with(TxOptions::default())
    }

    pub fn begin_with(&self, options: TxOptions) -> Result<SqliteTransaction<'_>> {
        self.ensure_open()?;
        SqliteTransaction::begin(self, options)
    }

    /// Run `body` in a transaction scope. A clean return commits and yields
    /// `Some`; a `Rollback` error rolls back and yields `None`; any other
    /// error rolls back and propagates.
    pub fn transaction<R>(
        &self,
        body: impl FnOnce(&SqliteTransaction<'_>) -> Result<R>,
    ) -> Result<Option<R>> {
        self.transaction_with(TxOptions::default(), body)
    }

    pub fn transaction_with<R>(
        &self,
        options: TxOptions,
        body: impl FnOnce(&SqliteTransaction<'_>) -> Result<R>,
    ) -> Result<Option<R>> {
        let commit = options.commit;
        let tx = self.begin_with(options)?;
        match body(&tx) {
            Ok(value) => {
                tx.finish(commit)?;
                Ok(Some(value))
            }
            Err(DbError::Rollback) => {
                tx.finish(false)?;
                Ok(None)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.finish(false) {
                    log::warn!("rollback after error failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    pub(crate) fn db_row_factory(&self) -> Option<RowFactory> {
        self.row_factory
            .read()
            .expect("row factory lock poisoned")
            .clone()
    }

    pub(crate) fn decltypes(&self) -> bool {
        self.parse_decltypes
    }
}

impl Queryable for SqliteDatabase {
    fn dialect(&self) -> &'static dyn Dialect {
        &SQLITE_DIALECT
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed() {
            return Err(DbError::NotOpen);
        }
        Ok(())
    }

    fn row_factory(&self) -> Option<RowFactory> {
        self.db_row_factory()
    }

    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>> {
        let conn = lock_conn(&self.conn)?;
        let cursor = run_query(&conn, sql, params, self.parse_decltypes)?;
        Ok(Rows::new(Box::new(cursor), self.db_row_factory()))
    }

    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64> {
        let conn = lock_conn(&self.conn)?;
        run_execute(&conn, sql, params)
    }

    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>> {
        let conn = lock_conn(&self.conn)?;
        run_insert(&conn, stmt)
    }

    fn raw_script(&self, sql: &str) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        run_script(&conn, sql)
    }
}

pub(crate) fn lock_conn(
    conn: &Mutex<RusqliteConnection>,
) -> Result<std::sync::MutexGuard<'_, RusqliteConnection>> {
    conn.lock()
        .map_err(|e| DbError::driver(format!("connection lock poisoned: {e}")))
}

/// Positional parameter wrapper bridging [`Value`] to the driver.
struct SqlParam<'a>(&'a Value);

impl rusqlite::ToSql for SqlParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self.0 {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*b as i64)),
            Value::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) | Value::Json(s) | Value::Decimal(s) => {
                ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))
            }
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(dt.to_rfc3339()))
            }
            Value::Date(d) => ToSqlOutput::Owned(rusqlite::types::Value::Text(
                d.format("%Y-%m-%d").to_string(),
            )),
            Value::Time(t) => ToSqlOutput::Owned(rusqlite::types::Value::Text(
                t.format("%H:%M:%S%.f").to_string(),
            )),
        };
        Ok(out)
    }
}

fn sqlite_value_to_value(row: &rusqlite::Row, idx: usize) -> Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::Int(i),
        Ok(ValueRef::Real(f)) => Value::Float(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).to_string()),
        Ok(ValueRef::Blob(b)) => Value::Bytes(b.to_vec()),
        Err(_) => Value::Null,
    }
}

/// Ensure a named parameter carries a driver prefix character.
fn named_key(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

fn params_values(params: &Params) -> Vec<Value> {
    match params {
        Params::None => Vec::new(),
        Params::Positional(values) => values.clone(),
        Params::Named(named) => named.iter().map(|(_, v)| v.clone()).collect(),
    }
}

pub(crate) fn run_query(
    conn: &RusqliteConnection,
    sql: &str,
    params: &Params,
    parse_decltypes: bool,
) -> Result<BufferedCursor> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| map_sqlite_error(e, sql, &params_values(params)))?;

    let description: Vec<ColumnDesc> = stmt
        .columns()
        .iter()
        .map(|c| {
            let decl = if parse_decltypes {
                c.decl_type().map(str::to_string)
            } else {
                None
            };
            ColumnDesc::new(c.name(), decl)
        })
        .collect();

    // Statements without a result set report their affected count instead.
    if description.is_empty() {
        let affected = execute_prepared(&mut stmt, sql, params)?;
        return Ok(BufferedCursor::new(Vec::new(), Vec::new()).with_rowcount(affected));
    }

    let column_count = description.len();
    let mut rows = Vec::new();
    {
        let mut driver_rows = query_prepared(&mut stmt, sql, params)?;
        loop {
            match driver_rows.next() {
                Ok(Some(row)) => {
                    let values: Vec<Value> = (0..column_count)
                        .map(|i| sqlite_value_to_value(row, i))
                        .collect();
                    rows.push(values);
                }
                Ok(None) => break,
                Err(e) => return Err(map_sqlite_error(e, sql, &params_values(params))),
            }
        }
    }

    Ok(BufferedCursor::new(description, rows))
}

fn query_prepared<'s>(
    stmt: &'s mut rusqlite::CachedStatement<'_>,
    sql: &str,
    params: &Params,
) -> Result<rusqlite::Rows<'s>> {
    let result = match params {
        Params::None => stmt.query([]),
        Params::Positional(values) => {
            stmt.query(rusqlite::params_from_iter(values.iter().map(SqlParam)))
        }
        Params::Named(named) => {
            let keyed: Vec<(String, SqlParam)> = named
                .iter()
                .map(|(name, value)| (named_key(name), SqlParam(value)))
                .collect();
            let refs: Vec<(&str, &dyn rusqlite::ToSql)> = keyed
                .iter()
                .map(|(name, param)| (name.as_str(), param as &dyn rusqlite::ToSql))
                .collect();
            stmt.query(refs.as_slice())
        }
    };
    result.map_err(|e| map_sqlite_error(e, sql, &params_values(params)))
}

fn execute_prepared(
    stmt: &mut rusqlite::CachedStatement<'_>,
    sql: &str,
    params: &Params,
) -> Result<u64> {
    let result = match params {
        Params::None => stmt.execute([]),
        Params::Positional(values) => {
            stmt.execute(rusqlite::params_from_iter(values.iter().map(SqlParam)))
        }
        Params::Named(named) => {
            let keyed: Vec<(String, SqlParam)> = named
                .iter()
                .map(|(name, value)| (named_key(name), SqlParam(value)))
                .collect();
            let refs: Vec<(&str, &dyn rusqlite::ToSql)> = keyed
                .iter()
                .map(|(name, param)| (name.as_str(), param as &dyn rusqlite::ToSql))
                .collect();
            stmt.execute(refs.as_slice())
        }
    };
    result
        .map(|n| n as u64)
        .map_err(|e| map_sqlite_error(e, sql, &params_values(params)))
}

pub(crate) fn run_execute(conn: &RusqliteConnection, sql: &str, params: &Params) -> Result<u64> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| map_sqlite_error(e, sql, &params_values(params)))?;
    execute_prepared(&mut stmt, sql, params)
}

pub(crate) fn run_insert(conn: &RusqliteConnection, stmt: &Statement) -> Result<Option<Value>> {
    run_execute(conn, &stmt.sql, &Params::Positional(stmt.params.clone()))?;
    // The driver reports the key through the connection, not the SQL.
    Ok(Some(Value::Int(conn.last_insert_rowid())))
}

pub(crate) fn run_script(conn: &RusqliteConnection, sql: &str) -> Result<()> {
    conn.execute_batch(sql)
        .map_err(|e| map_sqlite_error(e, sql, &[]))
}

fn map_sqlite_error(e: rusqlite::Error, sql: &str, params: &[Value]) -> DbError {
    let (message, code, integrity) = match &e {
        rusqlite::Error::SqliteFailure(err, msg) => (
            msg.clone().unwrap_or_else(|| e.to_string()),
            Some(format!("{:?} ({})", err.code, err.extended_code)),
            err.code == rusqlite::ErrorCode::ConstraintViolation,
        ),
        _ => (e.to_string(), None, false),
    };

    let mut failure = DriverFailure::new(message).with_statement(sql, params);
    if let Some(code) = code {
        failure = failure.with_code(code);
    }
    log::error!("sqlite statement failed: {failure}");

    if integrity {
        DbError::Integrity(failure)
    } else {
        DbError::Driver(failure)
    }
}
