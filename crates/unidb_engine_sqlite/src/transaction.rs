use std::cell::Cell;
use std::sync::MutexGuard;

use unidb_core::{
    DbError, Dialect, Params, Queryable, Result, RowFactory, Rows, Statement, TxOptions, Value,
};

use crate::database::{
    SQLITE_DIALECT, SqliteDatabase, lock_conn, run_execute, run_insert, run_query, run_script,
};

/// A transaction scope on the embedded engine.
///
/// Exclusive by default: the scope holds the Database's transaction lock
/// until it ends, serializing concurrent scopes, because the driver shares
/// transaction state per connection. Opt out with `exclusive(false)` for
/// read-only scopes.
///
/// `commit()` and `rollback()` complete the current driver transaction and
/// immediately begin another, so a scope stays usable until it is closed.
/// Dropping an open scope rolls back.
pub struct SqliteTransaction<'db> {
    db: &'db SqliteDatabase,
    _scope: Option<MutexGuard<'db, ()>>,
    open: Cell<bool>,
    schema: Option<String>,
}

impl<'db> SqliteTransaction<'db> {
    pub(crate) fn begin(db: &'db SqliteDatabase, options: TxOptions) -> Result<Self> {
        if options.lazy {
            return Err(DbError::bad_argument(
                "lazy transactions require the networked engine",
            ));
        }

        let scope = if options.exclusive {
            Some(
                db.scope_lock
                    .lock()
                    .map_err(|e| DbError::driver(format!("scope lock poisoned: {e}")))?,
            )
        } else {
            None
        };

        {
            let conn = lock_conn(&db.conn)?;
            run_script(&conn, "BEGIN IMMEDIATE")?;
        }
        log::debug!("[TX] begin (exclusive: {})", options.exclusive);

        Ok(Self {
            db,
            _scope: scope,
            open: Cell::new(true),
            schema: options.schema,
        })
    }

    /// Commit the buffered work and begin a fresh driver transaction; the
    /// scope remains usable.
    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let conn = lock_conn(&self.db.conn)?;
        run_script(&conn, "COMMIT")?;
        run_script(&conn, "BEGIN IMMEDIATE")?;
        log::debug!("[TX] commit");
        Ok(())
    }

    /// Discard the buffered work and begin a fresh driver transaction; the
    /// scope remains usable.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        let conn = lock_conn(&self.db.conn)?;
        run_script(&conn, "ROLLBACK")?;
        run_script(&conn, "BEGIN IMMEDIATE")?;
        log::debug!("[TX] rollback");
        Ok(())
    }

    /// End the scope, committing when `commit` is true.
    pub fn close(self, commit: bool) -> Result<()> {
        self.finish(commit)
    }

    pub(crate) fn finish(&self, commit: bool) -> Result<()> {
        if !self.open.replace(false) {
            return Ok(());
        }
        let conn = lock_conn(&self.db.conn)?;
        run_script(&conn, if commit { "COMMIT" } else { "ROLLBACK" })?;
        log::debug!("[TX] closed ({})", if commit { "commit" } else { "rollback" });
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.open.get() {
            if let Err(e) = self.finish(false) {
                log::warn!("rollback on drop failed: {e}");
            }
        }
    }
}

impl Queryable for SqliteTransaction<'_> {
    fn dialect(&self) -> &'static dyn Dialect {
        &SQLITE_DIALECT
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open.get() || self.db.closed() {
            return Err(DbError::NotOpen);
        }
        Ok(())
    }

    fn schema_prefix(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn row_factory(&self) -> Option<RowFactory> {
        self.db.db_row_factory()
    }

    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>> {
        let conn = lock_conn(&self.db.conn)?;
        let cursor = run_query(&conn, sql, params, self.db.decltypes())?;
        Ok(Rows::new(Box::new(cursor), self.db.db_row_factory()))
    }

    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64> {
        let conn = lock_conn(&self.db.conn)?;
        run_execute(&conn, sql, params)
    }

    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>> {
        let conn = lock_conn(&self.db.conn)?;
        run_insert(&conn, stmt)
    }

    fn raw_script(&self, sql: &str) -> Result<()> {
        let conn = lock_conn(&self.db.conn)?;
        run_script(&conn, sql)
    }
}
