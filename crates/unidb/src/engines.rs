use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use unidb_core::{DbError, Dialect, Result};
use unidb_engine_postgres::{ConnectOptions, POSTGRES_DIALECT, PostgresDatabase};
use unidb_engine_sqlite::{OpenOptions as SqliteOpenOptions, SQLITE_DIALECT, SqliteDatabase};

use crate::database::Database;

/// Open-time options spanning both engines; each engine reads the fields
/// that concern it.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Networked: connections opened eagerly.
    pub minconn: usize,
    /// Networked: pool upper bound.
    pub maxconn: usize,
    /// Embedded: feed declared column types to the converter registry.
    pub parse_decltypes: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            minconn: 1,
            maxconn: 4,
            parse_decltypes: true,
        }
    }
}

/// An engine adapter: name, Database opener, and dialect descriptor.
#[derive(Clone, Copy)]
pub struct Engine {
    pub name: &'static str,
    pub open: fn(&str, &OpenOptions) -> Result<Database>,
    pub dialect: &'static dyn Dialect,
}

fn open_sqlite(descriptor: &str, options: &OpenOptions) -> Result<Database> {
    let db = SqliteDatabase::open_with(
        descriptor,
        SqliteOpenOptions {
            parse_decltypes: options.parse_decltypes,
        },
    )?;
    Ok(Database::Sqlite(db))
}

fn open_postgres(descriptor: &str, options: &OpenOptions) -> Result<Database> {
    let db = PostgresDatabase::open_with(
        descriptor,
        ConnectOptions::new(options.minconn, options.maxconn),
    )?;
    Ok(Database::Postgres(db))
}

static ENGINES: LazyLock<RwLock<HashMap<&'static str, Engine>>> = LazyLock::new(|| {
    let mut engines = HashMap::new();
    engines.insert(
        "sqlite",
        Engine {
            name: "sqlite",
            open: open_sqlite,
            dialect: &SQLITE_DIALECT,
        },
    );
    engines.insert(
        "postgres",
        Engine {
            name: "postgres",
            open: open_postgres,
            dialect: &POSTGRES_DIALECT,
        },
    );
    RwLock::new(engines)
});

/// Register (or replace) an engine adapter under its name.
pub fn register_engine(engine: Engine) {
    ENGINES
        .write()
        .expect("engine registry poisoned")
        .insert(engine.name, engine);
    log::debug!("registered engine {}", engine.name);
}

/// Look up an engine adapter by name.
pub fn engine(name: &str) -> Option<Engine> {
    ENGINES
        .read()
        .expect("engine registry poisoned")
        .get(name)
        .copied()
}

#[derive(Default)]
struct Defaults {
    by_engine: HashMap<String, Arc<Database>>,
    first: Option<Arc<Database>>,
}

static DEFAULTS: LazyLock<Mutex<Defaults>> = LazyLock::new(|| Mutex::new(Defaults::default()));

/// Open a database and register it as the engine's default instance (the
/// first one opened per engine wins).
pub fn open(engine_name: &str, descriptor: &str) -> Result<Arc<Database>> {
    open_with(engine_name, descriptor, OpenOptions::default())
}

pub fn open_with(
    engine_name: &str,
    descriptor: &str,
    options: OpenOptions,
) -> Result<Arc<Database>> {
    let adapter = engine(engine_name)
        .ok_or_else(|| DbError::bad_argument(format!("unknown engine: {engine_name:?}")))?;

    let db = Arc::new((adapter.open)(descriptor, &options)?);

    let mut defaults = DEFAULTS.lock().expect("default registry poisoned");
    defaults
        .by_engine
        .entry(engine_name.to_string())
        .or_insert_with(|| db.clone());
    if defaults.first.is_none() {
        defaults.first = Some(db.clone());
    }

    Ok(db)
}

/// The first Database opened in this process.
pub fn init() -> Result<Arc<Database>> {
    DEFAULTS
        .lock()
        .expect("default registry poisoned")
        .first
        .clone()
        .ok_or_else(|| DbError::bad_argument("no database has been opened"))
}

/// The first Database opened for an engine.
pub fn init_engine(engine_name: &str) -> Result<Arc<Database>> {
    DEFAULTS
        .lock()
        .expect("default registry poisoned")
        .by_engine
        .get(engine_name)
        .cloned()
        .ok_or_else(|| {
            DbError::bad_argument(format!("no database has been opened for {engine_name:?}"))
        })
}

/// Clear the default-instance cache. Test hook.
pub fn reset_defaults() {
    let mut defaults = DEFAULTS.lock().expect("default registry poisoned");
    defaults.by_engine.clear();
    defaults.first = None;
}
