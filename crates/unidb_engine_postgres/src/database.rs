use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use postgres::{Client, Config};
use unidb_core::{
    ColumnResolver, DbError, Dialect, EngineKind, Params, PlaceholderStyle, Queryable, Result,
    Row, RowFactory, Rows, Statement, Target, TxOptions, Value, is_reserved_word,
};

use crate::config::{ConnectOptions, parse_descriptor};
use crate::pool::Pool;
use crate::transaction::PostgresTransaction;
use crate::values::{client_execute, client_insert, client_query, map_pg_error};

/// PostgreSQL dialect: `$N` placeholders, RETURNING, bare OFFSET.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::DollarNumber
    }

    fn needs_quoting(&self, name: &str) -> bool {
        // Unquoted identifiers fold to lowercase on the server, so anything
        // case-distinct must keep its quotes.
        name.is_empty()
            || name
                .chars()
                .next()
                .is_some_and(|c| !c.is_ascii_lowercase() && c != '_')
            || name
                .chars()
                .any(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '_')
            || is_reserved_word(name)
    }

    fn supports_returning(&self) -> bool {
        true
    }
}

pub static POSTGRES_DIALECT: PostgresDialect = PostgresDialect;

#[derive(Debug, Clone, Default)]
pub(crate) struct TableMeta {
    /// `(declared name, declared type, primary key)` in ordinal order.
    pub(crate) columns: Vec<(String, String, bool)>,
}

impl TableMeta {
    /// Resolve a caller-supplied column name to its declared casing: an
    /// exact match wins; otherwise a unique case-insensitive match.
    pub(crate) fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((declared, _, _)) = self.columns.iter().find(|(n, _, _)| n == name) {
            return Some(declared);
        }

        let mut matches = self
            .columns
            .iter()
            .filter(|(n, _, _)| n.eq_ignore_ascii_case(name));
        match (matches.next(), matches.next()) {
            (Some((declared, _, _)), None) => Some(declared),
            _ => None,
        }
    }

    pub(crate) fn decl_type(&self, name: &str) -> Option<&str> {
        let resolved = self.resolve(name)?;
        self.columns
            .iter()
            .find(|(n, _, _)| n == resolved)
            .map(|(_, ty, _)| ty.as_str())
    }

    pub(crate) fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, _, pk)| *pk)
            .map(|(n, _, _)| n.as_str())
    }
}

/// Networked Database: owns a bounded connection pool and a lazily-populated
/// schema cache; every autocommit operation runs on a freshly acquired
/// connection.
pub struct PostgresDatabase {
    pub(crate) pool: Pool,
    closed: AtomicBool,
    schema_cache: RwLock<HashMap<(String, String), TableMeta>>,
    row_factory: RwLock<Option<RowFactory>>,
}

impl PostgresDatabase {
    /// Open from a URI or keyword-value descriptor with default pool sizing.
    pub fn open(descriptor: &str) -> Result<Self> {
        Self::open_with(descriptor, ConnectOptions::default())
    }

    pub fn open_with(descriptor: &str, options: ConnectOptions) -> Result<Self> {
        Self::open_config(parse_descriptor(descriptor)?, options)
    }

    /// Open from an explicit driver configuration.
    pub fn open_config(config: Config, options: ConnectOptions) -> Result<Self> {
        let pool = Pool::new(config, options.minconn, options.maxconn)?;
        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
            schema_cache: RwLock::new(HashMap::new()),
            row_factory: RwLock::new(None),
        })
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the database closed and discard pooled connections.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close();
        }
    }

    /// Install a per-Database row factory, overriding the process-wide one.
    pub fn set_row_factory(
        &self,
        factory: impl Fn(Vec<(String, Value)>) -> Row + Send + Sync + 'static,
    ) {
        *self.row_factory.write().expect("row factory lock poisoned") =
            Some(std::sync::Arc::new(factory));
    }

    /// Begin a transaction scope with default options.
    pub fn begin(&self) -> Result<PostgresTransaction<'_>> {
        self.begin_with(TxOptions::default())
    }

    pub fn begin_with(&self, options: TxOptions) -> Result<PostgresTransaction<'_>> {
        self.ensure_open()?;
        PostgresTransaction::begin(self, options)
    }

    /// Run `body` in a transaction scope. A clean return commits and yields
    /// `Some`; a `Rollback` error rolls back and yields `None`; any other
    /// error rolls back and propagates.
    pub fn transaction<R>(
        &self,
        body: impl FnOnce(&PostgresTransaction<'_>) -> Result<R>,
    ) -> Result<Option<R>> {
        self.transaction_with(TxOptions::default(), body)
    }

    pub fn transaction_with<R>(
        &self,
        options: TxOptions,
        body: impl FnOnce(&PostgresTransaction<'_>) -> Result<R>,
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

    /// Drop every cached table description; the next reference re-introspects.
    pub(crate) fn invalidate_schema_cache(&self) {
        self.schema_cache
            .write()
            .expect("schema cache poisoned")
            .clear();
        log::debug!("schema cache invalidated");
    }

    pub(crate) fn cache_key(table: &str, schema: Option<&str>) -> (String, String) {
        let trimmed = table.trim_matches('"');
        match trimmed.split_once('.') {
            Some((schema_part, table_part)) => (
                schema_part.trim_matches('"').to_ascii_lowercase(),
                table_part.trim_matches('"').to_ascii_lowercase(),
            ),
            None => (
                schema.unwrap_or("public").to_ascii_lowercase(),
                trimmed.to_ascii_lowercase(),
            ),
        }
    }

    pub(crate) fn lookup_meta(&self, table: &str, schema: Option<&str>) -> Option<TableMeta> {
        let key = Self::cache_key(table, schema);
        self.schema_cache
            .read()
            .expect("schema cache poisoned")
            .get(&key)
            .cloned()
    }

    /// Introspect a table into the cache through the given connection; no-op
    /// when already cached. Unknown tables cache an empty description.
    pub(crate) fn ensure_cached(
        &self,
        client: &mut Client,
        table: &str,
        schema: Option<&str>,
    ) -> Result<()> {
        let key = Self::cache_key(table, schema);
        {
            let cache = self.schema_cache.read().expect("schema cache poisoned");
            if cache.contains_key(&key) {
                return Ok(());
            }
        }

        let meta = introspect(client, &key.0, &key.1)?;
        log::debug!(
            "cached schema for {}.{} ({} columns)",
            key.0,
            key.1,
            meta.columns.len()
        );
        self.schema_cache
            .write()
            .expect("schema cache poisoned")
            .insert(key, meta);
        Ok(())
    }
}

const COLUMNS_SQL: &str = "SELECT column_name, data_type \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND lower(table_name) = $2 \
     ORDER BY ordinal_position";

const PRIMARY_KEY_SQL: &str = "SELECT kcu.column_name \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON kcu.constraint_name = tc.constraint_name \
      AND kcu.table_schema = tc.table_schema \
     WHERE tc.constraint_type = 'PRIMARY KEY' \
       AND tc.table_schema = $1 AND lower(tc.table_name) = $2 \
     ORDER BY kcu.ordinal_position";

fn introspect(client: &mut Client, schema: &str, table: &str) -> Result<TableMeta> {
    let rows = client
        .query(COLUMNS_SQL, &[&schema, &table])
        .map_err(|e| map_pg_error(e, COLUMNS_SQL, &[]))?;

    let mut meta = TableMeta::default();
    for row in &rows {
        let name: String = row.get(0);
        let decl: String = row.get(1);
        meta.columns.push((name, decl, false));
    }

    if meta.columns.is_empty() {
        return Ok(meta);
    }

    let pk_rows = client
        .query(PRIMARY_KEY_SQL, &[&schema, &table])
        .map_err(|e| map_pg_error(e, PRIMARY_KEY_SQL, &[]))?;
    for row in &pk_rows {
        let pk: String = row.get(0);
        if let Some(column) = meta.columns.iter_mut().find(|(n, _, _)| *n == pk) {
            column.2 = true;
        }
    }

    Ok(meta)
}

impl ColumnResolver for PostgresDatabase {
    fn resolve_column(&self, table: &str, name: &str) -> Option<String> {
        self.lookup_meta(table, None)?
            .resolve(name)
            .map(str::to_string)
    }

    fn column_cast(&self, table: &str, name: &str) -> Option<String> {
        self.lookup_meta(table, None)?
            .decl_type(name)
            .map(str::to_string)
    }

    fn primary_key(&self, table: &str) -> Option<String> {
        self.lookup_meta(table, None)?
            .primary_key()
            .map(str::to_string)
    }
}

impl Queryable for PostgresDatabase {
    fn dialect(&self) -> &'static dyn Dialect {
        &POSTGRES_DIALECT
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed() {
            return Err(DbError::NotOpen);
        }
        Ok(())
    }

    fn resolver(&self) -> &dyn ColumnResolver {
        self
    }

    fn prepare_target(&self, target: &Target) -> Result<()> {
        let mut client = self.pool.acquire()?;
        self.ensure_cached(&mut client, target.table_name(), None)
    }

    fn row_factory(&self) -> Option<RowFactory> {
        self.db_row_factory()
    }

    fn raw_query(&self, sql: &str, params: &Params) -> Result<Rows<'_>> {
        let mut client = self.pool.acquire()?;
        let cursor = client_query(&mut client, sql, params)?;
        Ok(Rows::new(Box::new(cursor), self.db_row_factory()))
    }

    fn raw_execute(&self, sql: &str, params: &Params) -> Result<u64> {
        let mut client = self.pool.acquire()?;
        client_execute(&mut client, sql, params)
    }

    fn raw_insert(&self, stmt: &Statement) -> Result<Option<Value>> {
        let mut client = self.pool.acquire()?;
        client_insert(&mut client, stmt)
    }

    fn raw_script(&self, sql: &str) -> Result<()> {
        {
            let mut client = self.pool.acquire()?;
            client
                .batch_execute(sql)
                .map_err(|e| map_pg_error(e, sql, &[]))?;
        }
        // Scripts may reshape tables out from under the cache.
        self.invalidate_schema_cache();
        Ok(())
    }
}
