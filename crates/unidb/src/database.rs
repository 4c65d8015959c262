use unidb_core::{
    ColumnResolver, DbError, Dialect, Params, Queryable, Result, RowFactory, Rows, Statement,
    Target, TxOptions, Value,
};
use unidb_engine_postgres::{PostgresDatabase, PostgresTransaction};
use unidb_engine_sqlite::{SqliteDatabase, SqliteTransaction};

/// An open database of either engine.
///
/// Delegates the `Queryable` primitives to the engine database, so every
/// operation of the shared surface works uniformly on both.
pub enum Database {
    Sqlite(SqliteDatabase),
    Postgres(PostgresDatabase),
}

impl Database {
    pub fn engine_name(&self) -> &'static str {
        Queryable::dialect(self).name()
    }

    pub fn closed(&self) -> bool {
        match self {
            Database::Sqlite(db) => db.closed(),
            Database::Postgres(db) => db.closed(),
        }
    }

    /// Mark the database closed; pooled connections are discarded.
    pub fn close(&self) {
        match self {
            Database::Sqlite(db) => db.close(),
            Database::Postgres(db) => db.close(),
        }
    }

    pub fn as_sqlite(&self) -> Option<&SqliteDatabase> {
        match self {
            Database::Sqlite(db) => Some(db),
            Database::Postgres(_) => None,
        }
    }

    pub fn as_postgres(&self) -> Option<&PostgresDatabase> {
        match self {
            Database::Postgres(db) => Some(db),
            Database::Sqlite(_) => None,
        }
    }

    /// Run `body` in a transaction scope with default options.
    pub fn transaction<R>(
        &self,
        body: impl FnOnce(&Transaction<'_, '_>) -> Result<R>,
    ) -> Result<Option<R>> {
        self.transaction_with(TxOptions::default(), body)
    }

    /// Run `body` in a transaction scope. A clean return commits and yields
    /// `Some`; a `Rollback` error rolls back and yields `None`; any other
    /// error rolls back and propagates.
    pub fn transaction_with<R>(
        &self,
        options: TxOptions,
        body: impl FnOnce(&Transaction<'_, '_>) -> Result<R>,
    ) -> Result<Option<R>> {
        match self {
            Database::Sqlite(db) => {
                db.transaction_with(options, |tx| body(&Transaction::Sqlite(tx)))
            }
            Database::Postgres(db) => {
                db.transaction_with(options, |tx| body(&Transaction::Postgres(tx)))
            }
        }
    }
}

impl Queryable for Database {
    fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Database::Sqlite(db) => db.dialect(),
            Database::Postgres(db) => db.dialect(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed() {
            return Err(DbError::NotOpen);
        }
        Ok(())
    }

    fn resolver(&self) -> &dyn ColumnResolver {
        match self {
            Database::Sqlite(db) => Queryable::resolver(db),
            Database::Postgres(db) => Queryable::resolver(db),
        }
    }

    fn prepare_target(&self, target: &Target) -> Result<()> {
        match self {
            Database::Sqlite(db) => db.prepare_target(target),
            Database::Postgres(db) => db.prepare_target(target),
        }
    }

    fn row_factory(&self) -> Option<RowFactory> {
        match self {
            Database::Sqlite(db) => Queryable::row_factory(db),
            Database::Postgres(db) => Queryable::row_factory(db),
        }
    }

    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>> {
        match self {
            Database::Sqlite(db) => db.raw_query(sql, params),
            Database::Postgres(db) => db.raw_query(sql, params),
        }
    }

    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64> {
        match self {
            Database::Sqlite(db) => db.raw_execute(sql, params),
            Database::Postgres(db) => db.raw_execute(sql, params),
        }
    }

    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>> {
        match self {
            Database::Sqlite(db) => db.raw_insert(stmt),
            Database::Postgres(db) => db.raw_insert(stmt),
        }
    }

    fn raw_script(&self, sql: &str) -> Result<()> {
        match self {
            Database::Sqlite(db) => db.raw_script(sql),
            Database::Postgres(db) => db.raw_script(sql),
        }
    }
}

/// A transaction scope of either engine, as seen by `Database::transaction`.
pub enum Transaction<'a, 'db> {
    Sqlite(&'a SqliteTransaction<'db>),
    Postgres(&'a PostgresTransaction<'db>),
}

impl Transaction<'_, '_> {
    /// Commit the buffered work and begin a fresh driver transaction; the
    /// scope remains usable.
    pub fn commit(&self) -> Result<()> {
        match self {
            Transaction::Sqlite(tx) => tx.commit(),
            Transaction::Postgres(tx) => tx.commit(),
        }
    }

    /// Discard the buffered work and begin a fresh driver transaction; the
    /// scope remains usable.
    pub fn rollback(&self) -> Result<()> {
        match self {
            Transaction::Sqlite(tx) => tx.rollback(),
            Transaction::Postgres(tx) => tx.rollback(),
        }
    }
}

impl Queryable for Transaction<'_, '_> {
    fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Transaction::Sqlite(tx) => tx.dialect(),
            Transaction::Postgres(tx) => tx.dialect(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self {
            Transaction::Sqlite(tx) => tx.ensure_open(),
            Transaction::Postgres(tx) => tx.ensure_open(),
        }
    }

    fn schema_prefix(&self) -> Option<&str> {
        match self {
            Transaction::Sqlite(tx) => tx.schema_prefix(),
            Transaction::Postgres(tx) => tx.schema_prefix(),
        }
    }

    fn resolver(&self) -> &dyn ColumnResolver {
        match self {
            Transaction::Sqlite(tx) => Queryable::resolver(*tx),
            Transaction::Postgres(tx) => Queryable::resolver(*tx),
        }
    }

    fn prepare_target(&self, target: &Target) -> Result<()> {
        match self {
            Transaction::Sqlite(tx) => tx.prepare_target(target),
            Transaction::Postgres(tx) => tx.prepare_target(target),
        }
    }

    fn row_factory(&self) -> Option<RowFactory> {
        match self {
            Transaction::Sqlite(tx) => Queryable::row_factory(*tx),
            Transaction::Postgres(tx) => Queryable::row_factory(*tx),
        }
    }

    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>> {
        match self {
            Transaction::Sqlite(tx) => tx.raw_query(sql, params),
            Transaction::Postgres(tx) => tx.raw_query(sql, params),
        }
    }

    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64> {
        match self {
            Transaction::Sqlite(tx) => tx.raw_execute(sql, params),
            Transaction::Postgres(tx) => tx.raw_execute(sql, params),
        }
    }

    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>> {
        match self {
            Transaction::Sqlite(tx) => tx.raw_insert(stmt),
            Transaction::Postgres(tx) => tx.raw_insert(stmt),
        }
    }

    fn raw_script(&self, sql: &str) -> Result<()> {
        match self {
            Transaction::Sqlite(tx) => tx.raw_script(sql),
            Transaction::Postgres(tx) => tx.raw_script(sql),
        }
    }
}
