use crate::argument::{Filter, Params, Query, Target, Values};
use crate::assemble::{
    ColumnResolver, NoResolver, Statement, assemble_delete, assemble_insert, assemble_select,
    assemble_update,
};
use crate::cursor::Rows;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::record::Record;
use crate::registry::RowFactory;
use crate::row::Row;
use crate::value::Value;

/// The abstract operation surface shared by Database and Transaction.
///
/// Engines implement the `raw_*` primitives plus the accessors; every public
/// operation is a provided method that assembles a statement and hands it to
/// a primitive. There is no inheritance between Database and Transaction —
/// both compose the same assembly layer through this trait.
pub trait Queryable {
    /// The engine's SQL dialect.
    fn dialect(&self) -> &'static dyn Dialect;

    /// Fail with `NotOpen` when the underlying handle is closed.
    fn ensure_open(&self) -> Result<()>;

    /// Schema name prefixed to unqualified tables (transaction option).
    fn schema_prefix(&self) -> Option<&str> {
        None
    }

    /// Schema knowledge for casing resolution, casts, and RETURNING keys.
    fn resolver(&self) -> &dyn ColumnResolver {
        &NoResolver
    }

    /// Populate schema knowledge for a target before assembly (networked).
    fn prepare_target(&self, target: &Target) -> Result<()> {
        let _ = target;
        Ok(())
    }

    /// Per-Database row factory, overriding the process-wide one.
    fn row_factory(&self) -> Option<RowFactory> {
        None
    }

    /// Run a statement that produces a result set. Statements that produce
    /// none yield an empty cursor carrying the affected-row count.
    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>>;

    /// Run a statement for its affected-row count.
    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64>;

    /// Run an assembled INSERT and report the new primary key, if any.
    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>>;

    /// Run a multi-statement script. No parameters.
    fn raw_script(&self, sql: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Lazy row iterator over the matching rows.
    fn select(&self, target: impl Into<Target>, query: impl Into<Query>) -> Result<Rows<'_>>
    where
        Self: Sized,
    {
        let target = target.into();
        let query = query.into();
        self.ensure_open()?;
        self.prepare_target(&target)?;

        let stmt = assemble_select(
            self.dialect(),
            self.resolver(),
            self.schema_prefix(),
            &target,
            &query,
        )?;
        log::debug!("[SQL] {}", stmt.preview());
        self.raw_query(&stmt.sql, &Params::Positional(stmt.params))
    }

    /// All matching rows, materialized.
    fn fetchall(&self, target: impl Into<Target>, query: impl Into<Query>) -> Result<Vec<Row>>
    where
        Self: Sized,
    {
        self.select(target, query)?.collect_all()
    }

    /// The first matching row, or `None`.
    fn fetchone(&self, target: impl Into<Target>, query: impl Into<Query>) -> Result<Option<Row>>
    where
        Self: Sized,
    {
        self.select(target, query)?.first()
    }

    /// Insert one row; returns the engine-reported primary key, if any.
    fn insert(&self, target: impl Into<Target>, values: impl Into<Values>) -> Result<Option<Value>>
    where
        Self: Sized,
    {
        let target = target.into();
        let values = values.into();
        self.ensure_open()?;
        self.prepare_target(&target)?;

        let stmt = assemble_insert(
            self.dialect(),
            self.resolver(),
            self.schema_prefix(),
            &target,
            &values,
        )?;
        log::debug!("[SQL] {}", stmt.preview());
        self.raw_insert(&stmt)
    }

    /// Insert several rows, each independently adapted; returns the primary
    /// keys in order. Engines cache the prepared statement, so the repeats
    /// cost one parse.
    fn insertmany(
        &self,
        target: impl Into<Target>,
        rows: impl IntoIterator<Item = Values>,
    ) -> Result<Vec<Option<Value>>>
    where
        Self: Sized,
    {
        let target = target.into();
        rows.into_iter()
            .map(|values| self.insert(target.clone(), values))
            .collect()
    }

    /// Update matching rows; returns the affected count.
    fn update(
        &self,
        target: impl Into<Target>,
        values: impl Into<Values>,
        filter: impl Into<Filter>,
    ) -> Result<u64>
    where
        Self: Sized,
    {
        let target = target.into();
        let values = values.into();
        let filter = filter.into();
        self.ensure_open()?;
        self.prepare_target(&target)?;

        let stmt = assemble_update(
            self.dialect(),
            self.resolver(),
            self.schema_prefix(),
            &target,
            &values,
            &filter,
        )?;
        log::debug!("[SQL] {}", stmt.preview());
        self.raw_execute(&stmt.sql, &Params::Positional(stmt.params))
    }

    /// Delete matching rows; returns the affected count.
    fn delete(&self, target: impl Into<Target>, filter: impl Into<Filter>) -> Result<u64>
    where
        Self: Sized,
    {
        let target = target.into();
        let filter = filter.into();
        self.ensure_open()?;
        self.prepare_target(&target)?;

        let stmt = assemble_delete(
            self.dialect(),
            self.resolver(),
            self.schema_prefix(),
            &target,
            &filter,
        )?;
        log::debug!("[SQL] {}", stmt.preview());
        self.raw_execute(&stmt.sql, &Params::Positional(stmt.params))
    }

    /// Raw SQL passthrough. The caller owns dialect compatibility, including
    /// placeholder style. Returns a cursor; non-query statements yield an
    /// empty one carrying the affected count.
    fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<Rows<'_>>
    where
        Self: Sized,
    {
        self.ensure_open()?;
        let params = params.into();
        log::debug!("[SQL] {}", Statement::new(sql, vec![]).preview());
        self.raw_query(sql, &params)
    }

    /// Run one statement per parameter set; returns the total affected count.
    fn executemany(
        &self,
        sql: &str,
        param_sets: impl IntoIterator<Item = Params>,
    ) -> Result<u64>
    where
        Self: Sized,
    {
        self.ensure_open()?;
        let mut total = 0;
        for params in param_sets {
            total += self.raw_execute(sql, &params)?;
        }
        Ok(total)
    }

    /// Execute one or more `;`-delimited statements. Takes no parameters.
    /// On the networked engine this also invalidates the schema cache.
    fn executescript(&self, sql: &str) -> Result<()>
    where
        Self: Sized,
    {
        self.ensure_open()?;
        log::debug!("[SQL] script: {}", Statement::new(sql, vec![]).preview());
        self.raw_script(sql)
    }

    /// Quote an identifier unconditionally. Idempotent.
    fn quote(&self, name: &str) -> String {
        self.dialect().quote_identifier(name)
    }

    // ------------------------------------------------------------------
    // Record-typed operations
    // ------------------------------------------------------------------

    /// Insert a record instance into its bound table.
    fn insert_record<R: Record>(&self, record: &R) -> Result<Option<Value>>
    where
        Self: Sized,
    {
        self.insert(Target::record::<R>(), Values::from_record(record))
    }

    /// All matching rows, materialized as record instances.
    fn fetchall_as<R: Record>(&self, query: impl Into<Query>) -> Result<Vec<R>>
    where
        Self: Sized,
    {
        self.fetchall(Target::record::<R>(), query)?
            .iter()
            .map(R::from_row)
            .collect()
    }

    /// The first matching row as a record instance, or `None`.
    fn fetchone_as<R: Record>(&self, query: impl Into<Query>) -> Result<Option<R>>
    where
        Self: Sized,
    {
        match self.fetchone(Target::record::<R>(), query)? {
            Some(row) => Ok(Some(R::from_row(&row)?)),
            None => Ok(None),
        }
    }
}
