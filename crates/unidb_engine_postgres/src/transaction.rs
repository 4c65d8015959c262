use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use unidb_core::{
    ColumnDesc, ColumnResolver, Cursor, DbError, Dialect, Params, Queryable, Result, RowFactory,
    Rows, Statement, TxOptions, Value,
};

use crate::database::{POSTGRES_DIALECT, PostgresDatabase};
use crate::pool::PooledClient;
use crate::values::{
    client_execute, client_insert, client_query, describe, inline_params, map_pg_error,
    positional, postgres_value_to_value,
};

/// A transaction scope on the networked engine.
///
/// The scope owns one pooled connection until it ends; other scopes and
/// autocommit operations run on their own connections with the driver's
/// default per-transaction isolation.
///
/// With `lazy(true)` the scope is backed by a server-side cursor: exactly
/// one `select` may be issued and its rows stream in `itersize` batches;
/// every other operation fails with `BadArgument`.
pub struct PostgresTransaction<'db> {
    db: &'db PostgresDatabase,
    client: RefCell<Option<PooledClient<'db>>>,
    open: Cell<bool>,
    lazy: bool,
    lazy_used: Cell<bool>,
    cursor_seq: Cell<u32>,
    itersize: usize,
    schema: Option<String>,
}

impl<'db> PostgresTransaction<'db> {
    pub(crate) fn begin(db: &'db PostgresDatabase, options: TxOptions) -> Result<Self> {
        let mut client = db.pool.acquire()?;
        client
            .batch_execute("BEGIN")
            .map_err(|e| map_pg_error(e, "BEGIN", &[]))?;
        log::debug!("[TX] begin (lazy: {})", options.lazy);

        Ok(Self {
            db,
            client: RefCell::new(Some(client)),
            open: Cell::new(true),
            lazy: options.lazy,
            lazy_used: Cell::new(false),
            cursor_seq: Cell::new(0),
            itersize: options.itersize,
            schema: options.schema,
        })
    }

    /// Commit the buffered work and begin a fresh driver transaction; the
    /// scope remains usable.
    pub fn commit(&self) -> Result<()> {
        self.run_control("COMMIT; BEGIN")
    }

    /// Discard the buffered work and begin a fresh driver transaction; the
    /// scope remains usable.
    pub fn rollback(&self) -> Result<()> {
        self.run_control("ROLLBACK; BEGIN")
    }

    fn run_control(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        let mut borrow = self.client.borrow_mut();
        let client = borrow.as_mut().ok_or(DbError::NotOpen)?;
        client
            .batch_execute(sql)
            .map_err(|e| map_pg_error(e, sql, &[]))?;
        log::debug!("[TX] {}", sql);
        Ok(())
    }

    /// End the scope, committing when `commit` is true, and return the
    /// connection to the pool.
    pub fn close(self, commit: bool) -> Result<()> {
        self.finish(commit)
    }

    pub(crate) fn finish(&self, commit: bool) -> Result<()> {
        if !self.open.replace(false) {
            return Ok(());
        }

        let client = self.client.borrow_mut().take();
        let result = match client {
            Some(mut client) => {
                let sql = if commit { "COMMIT" } else { "ROLLBACK" };
                client
                    .batch_execute(sql)
                    .map_err(|e| map_pg_error(e, sql, &[]))
            }
            None => Ok(()),
        };
        log::debug!("[TX] closed ({})", if commit { "commit" } else { "rollback" });
        result
    }

    fn with_client<R>(&self, body: impl FnOnce(&mut PooledClient<'db>) -> Result<R>) -> Result<R> {
        let mut borrow = self.client.borrow_mut();
        let client = borrow.as_mut().ok_or(DbError::NotOpen)?;
        body(client)
    }

    fn reject_in_lazy<T>(&self) -> Result<T> {
        Err(DbError::bad_argument(
            "a lazy transaction permits a single select",
        ))
    }
}

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if self.open.get() {
            if let Err(e) = self.finish(false) {
                log::warn!("rollback on drop failed: {e}");
            }
        }
    }
}

impl ColumnResolver for PostgresTransaction<'_> {
    fn resolve_column(&self, table: &str, name: &str) -> Option<String> {
        self.db
            .lookup_meta(table, self.schema.as_deref())?
            .resolve(name)
            .map(str::to_string)
    }

    fn column_cast(&self, table: &str, name: &str) -> Option<String> {
        self.db
            .lookup_meta(table, self.schema.as_deref())?
            .decl_type(name)
            .map(str::to_string)
    }

    fn primary_key(&self, table: &str) -> Option<String> {
        self.db
            .lookup_meta(table, self.schema.as_deref())?
            .primary_key()
            .map(str::to_string)
    }
}

impl Queryable for PostgresTransaction<'_> {
    fn dialect(&self) -> &'static dyn Dialect {
        &POSTGRES_DIALECT
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

    fn resolver(&self) -> &dyn ColumnResolver {
        self
    }

    fn prepare_target(&self, target: &unidb_core::Target) -> Result<()> {
        let schema = self.schema.clone();
        self.with_client(|client| {
            self.db
                .ensure_cached(client, target.table_name(), schema.as_deref())
        })
    }

    fn row_factory(&self) -> Option<RowFactory> {
        self.db.db_row_factory()
    }

    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>> {
        if !self.lazy {
            let cursor = self.with_client(|client| client_query(client, sql, params))?;
            return Ok(Rows::new(Box::new(cursor), self.db.db_row_factory()));
        }

        if self.lazy_used.replace(true) {
            return self.reject_in_lazy();
        }

        // Server-side cursor: the declaration cannot bind parameters, so
        // they are inlined as literals.
        let values = positional(params)?;
        let inlined = inline_params(&POSTGRES_DIALECT, sql, values);
        let seq = self.cursor_seq.get() + 1;
        self.cursor_seq.set(seq);
        let name = format!("unidb_cursor_{seq}");
        let declare = format!("DECLARE {name} NO SCROLL CURSOR FOR {inlined}");
        let fetch = format!("FETCH FORWARD {} FROM {name}", self.itersize);

        let prepared = self.with_client(|client| {
            client
                .batch_execute(&declare)
                .map_err(|e| map_pg_error(e, &declare, &[]))?;
            client.prepare(&fetch).map_err(|e| map_pg_error(e, &fetch, &[]))
        })?;

        let cursor = LazyCursor {
            client: &self.client,
            description: describe(prepared.columns()),
            prepared,
            fetch_sql: fetch,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        Ok(Rows::new(Box::new(cursor), self.db.db_row_factory()))
    }

    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64> {
        if self.lazy {
            return self.reject_in_lazy();
        }
        self.with_client(|client| client_execute(client, sql, params))
    }

    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>> {
        if self.lazy {
            return self.reject_in_lazy();
        }
        self.with_client(|client| client_insert(client, stmt))
    }

    fn raw_script(&self, sql: &str) -> Result<()> {
        if self.lazy {
            return self.reject_in_lazy();
        }
        self.with_client(|client| {
            client
                .batch_execute(sql)
                .map_err(|e| map_pg_error(e, sql, &[]))
        })?;
        self.db.invalidate_schema_cache();
        Ok(())
    }
}

/// Cursor over a server-side cursor, fetching `itersize` rows at a time as
/// the caller iterates.
struct LazyCursor<'s, 'db> {
    client: &'s RefCell<Option<PooledClient<'db>>>,
    description: Vec<ColumnDesc>,
    prepared: postgres::Statement,
    fetch_sql: String,
    buffer: VecDeque<Vec<Value>>,
    exhausted: bool,
}

impl Cursor for LazyCursor<'_, '_> {
    fn description(&self) -> &[ColumnDesc] {
        &self.description
    }

    fn fetchone(&mut self) -> Result<Option<Vec<Value>>> {
        if let Some(row) = self.buffer.pop_front() {
            return Ok(Some(row));
        }
        if self.exhausted {
            return Ok(None);
        }

        let mut borrow = self.client.borrow_mut();
        let client = borrow.as_mut().ok_or(DbError::NotOpen)?;
        let rows = client
            .query(&self.prepared, &[])
            .map_err(|e| map_pg_error(e, &self.fetch_sql, &[]))?;
        drop(borrow);

        if rows.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        for row in &rows {
            let values: Vec<Value> = (0..self.description.len())
                .map(|i| postgres_value_to_value(row, i))
                .collect();
            self.buffer.push_back(values);
        }
        Ok(self.buffer.pop_front())
    }
}
