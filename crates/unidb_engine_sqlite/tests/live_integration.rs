use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unidb_core::{
    Col, DbError, Filter, Params, Query, Queryable, Record, Result, Row, TxOptions, Value,
    register_adapter, register_converter, registry,
};
use unidb_engine_sqlite::SqliteDatabase;

// The adapter/converter registries are process-wide; serialize the tests
// that touch them.
static REGISTRY_LOCK: Mutex<()> = Mutex::new(());

fn open_db() -> Result<SqliteDatabase> {
    let _ = env_logger::builder().is_test(true).try_init();
    let db = SqliteDatabase::open_in_memory()?;
    db.executescript("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)")?;
    Ok(db)
}

#[test]
fn file_backed_database_persists_across_reopens() -> Result<()> {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");

    {
        let db = SqliteDatabase::open(&path)?;
        db.executescript("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)")?;
        db.insert("t", ("val", "persisted"))?;
        db.close();
    }

    let db = SqliteDatabase::open(&path)?;
    let row = db.fetchone("t", ())?.expect("row survived reopen");
    assert_eq!(row.get_str("val"), Some("persisted"));

    Ok(())
}

// ---------------------------------------------------------------------------
// Basic operations
// ---------------------------------------------------------------------------

#[test]
fn insert_and_fetch_in_order() -> Result<()> {
    let db = open_db()?;

    assert_eq!(db.insert("t", ("val", Value::Null))?, Some(Value::Int(1)));
    assert_eq!(db.insert("t", ("val", "a"))?, Some(Value::Int(2)));

    let rows = db.fetchall("t", Query::new().order_by("id"))?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(rows[0].get("val"), Some(&Value::Null));
    assert_eq!(rows[1].get("val"), Some(&Value::Text("a".into())));

    Ok(())
}

#[test]
fn in_list_with_null_matches_only_comparable_rows() -> Result<()> {
    let db = open_db()?;
    db.insert("t", ("val", Value::Null))?;
    db.insert("t", ("val", "a"))?;

    // NULL never compares equal inside IN; only the 'a' row comes back.
    let rows = db.fetchall(
        "t",
        Filter::new().is_in("val", [Value::Null, Value::Text("a".into())]),
    )?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(2)));

    Ok(())
}

#[test]
fn raw_expression_composes_with_equality() -> Result<()> {
    let db = open_db()?;
    for val in ["a", "b", "a"] {
        db.insert("t", ("val", val))?;
    }

    let rows = db.fetchall(
        "t",
        Query::new()
            .filter(Filter::new().expr("id < ? OR id > ?", [1, 2]))
            .eq("val", "a"),
    )?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(3)));

    Ok(())
}

#[test]
fn update_reports_affected_count() -> Result<()> {
    let db = open_db()?;
    db.insert("t", ("val", "a"))?;
    db.insert("t", ("val", "b"))?;

    assert_eq!(db.update("t", ("val", "z"), ("id", 2))?, 1);

    let row = db.fetchone("t", ("id", 2))?.expect("row 2 exists");
    assert_eq!(row.get("val"), Some(&Value::Text("z".into())));

    Ok(())
}

#[test]
fn delete_and_empty_fetchone() -> Result<()> {
    let db = open_db()?;
    db.insert("t", ("val", "a"))?;

    assert_eq!(db.delete("t", ("id", 1))?, 1);
    assert!(db.fetchone("t", ("id", 1))?.is_none());

    Ok(())
}

#[test]
fn insertmany_returns_keys_in_order() -> Result<()> {
    let db = open_db()?;

    let keys = db.insertmany(
        "t",
        vec![
            unidb_core::Values::new().set("val", "a"),
            unidb_core::Values::new().set("val", "b"),
            unidb_core::Values::new().set("val", Value::Null),
        ],
    )?;
    assert_eq!(
        keys,
        vec![
            Some(Value::Int(1)),
            Some(Value::Int(2)),
            Some(Value::Int(3))
        ]
    );

    Ok(())
}

#[test]
fn execute_passthrough_and_named_params() -> Result<()> {
    let db = open_db()?;

    let cursor = db.execute("INSERT INTO t (val) VALUES (?)", [Value::Text("x".into())])?;
    assert_eq!(cursor.affected(), Some(1));

    db.execute(
        "INSERT INTO t (val) VALUES (:v)",
        Params::Named(vec![("v".to_string(), Value::Text("y".into()))]),
    )?;

    let rows = db.fetchall("t", Query::new().order_by("id"))?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("val"), Some(&Value::Text("y".into())));

    Ok(())
}

#[test]
fn executemany_totals_affected_rows() -> Result<()> {
    let db = open_db()?;

    let total = db.executemany(
        "INSERT INTO t (val) VALUES (?)",
        vec![
            Params::from([Value::Text("a".into())]),
            Params::from([Value::Text("b".into())]),
        ],
    )?;
    assert_eq!(total, 2);

    Ok(())
}

#[test]
fn quote_is_unconditional_and_idempotent() -> Result<()> {
    let db = open_db()?;
    assert_eq!(db.quote("plain"), "\"plain\"");
    assert_eq!(db.quote("\"plain\""), "\"plain\"");
    Ok(())
}

#[test]
fn closed_database_rejects_operations() -> Result<()> {
    let db = open_db()?;
    db.close();
    assert!(matches!(db.fetchall("t", ()), Err(DbError::NotOpen)));
    assert!(matches!(db.begin(), Err(DbError::NotOpen)));
    Ok(())
}

#[test]
fn constraint_violations_are_integrity_failures() -> Result<()> {
    let db = open_db()?;
    db.executescript("CREATE TABLE u (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")?;
    db.insert("u", ("name", "dup"))?;

    let err = db.insert("u", ("name", "dup")).unwrap_err();
    assert!(err.is_integrity(), "expected integrity failure, got {err}");
    let failure = err.failure().expect("failure carries the statement");
    assert!(failure.sql.as_deref().unwrap_or("").contains("INSERT INTO u"));

    Ok(())
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[test]
fn rollback_sentinel_is_suppressed() -> Result<()> {
    let db = open_db()?;
    db.insert("t", ("val", "before"))?;

    let outcome = db.transaction(|tx| -> Result<()> {
        tx.insert("t", ("val", "one"))?;
        tx.insert("t", ("val", "two"))?;
        Err(DbError::Rollback)
    })?;
    assert!(outcome.is_none());

    let rows = db.fetchall("t", ())?;
    assert_eq!(rows.len(), 1);

    Ok(())
}

#[test]
fn clean_scope_commits() -> Result<()> {
    let db = open_db()?;

    let outcome = db.transaction(|tx| {
        tx.insert("t", ("val", "kept"))?;
        Ok(42)
    })?;
    assert_eq!(outcome, Some(42));
    assert_eq!(db.fetchall("t", ())?.len(), 1);

    Ok(())
}

#[test]
fn other_errors_roll_back_and_propagate() -> Result<()> {
    let db = open_db()?;

    let result: Result<Option<()>> = db.transaction(|tx| {
        tx.insert("t", ("val", "doomed"))?;
        Err(DbError::bad_argument("caller bug"))
    });
    assert!(matches!(result, Err(DbError::BadArgument(_))));
    assert!(db.fetchall("t", ())?.is_empty());

    Ok(())
}

#[test]
fn scope_configured_without_commit_rolls_back() -> Result<()> {
    let db = open_db()?;

    let outcome = db.transaction_with(TxOptions::new().commit(false), |tx| {
        tx.insert("t", ("val", "transient"))?;
        Ok(())
    })?;
    assert!(outcome.is_some());
    assert!(db.fetchall("t", ())?.is_empty());

    Ok(())
}

#[test]
fn scope_is_reusable_after_commit_and_rollback() -> Result<()> {
    let db = open_db()?;

    db.transaction(|tx| {
        tx.insert("t", ("val", "first"))?;
        tx.commit()?;

        tx.insert("t", ("val", "discarded"))?;
        tx.rollback()?;

        tx.insert("t", ("val", "second"))?;
        Ok(())
    })?;

    let rows = db.fetchall("t", Query::new().order_by("id"))?;
    let vals: Vec<&str> = rows.iter().filter_map(|r| r.get_str("val")).collect();
    assert_eq!(vals, vec!["first", "second"]);

    Ok(())
}

#[test]
fn dropped_guard_rolls_back() -> Result<()> {
    let db = open_db()?;

    {
        let tx = db.begin()?;
        tx.insert("t", ("val", "never"))?;
        // Dropped without close: rolled back.
    }

    assert!(db.fetchall("t", ())?.is_empty());
    Ok(())
}

#[test]
fn exclusive_scopes_run_strictly_serially() -> Result<()> {
    let db = Arc::new(open_db()?);
    let inside = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let db = db.clone();
        let inside = inside.clone();
        let overlapped = overlapped.clone();
        handles.push(std::thread::spawn(move || {
            db.transaction(|tx| {
                if inside.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                tx.insert("t", ("val", "x"))?;
                std::thread::sleep(Duration::from_millis(50));
                inside.store(false, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!overlapped.load(Ordering::SeqCst), "scopes overlapped");
    assert_eq!(db.fetchall("t", ())?.len(), 2);

    Ok(())
}

#[test]
fn lazy_mode_is_rejected_on_the_embedded_engine() -> Result<()> {
    let db = open_db()?;
    let result = db.begin_with(TxOptions::new().lazy(true));
    assert!(matches!(result, Err(DbError::BadArgument(_))));
    Ok(())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

struct Todo {
    id: Option<i64>,
    title: String,
    done: bool,
}

impl Record for Todo {
    const TABLE: &'static str = "todos";

    fn columns() -> &'static [Col] {
        const COLS: &[Col] = &[Col::new("id"), Col::new("title"), Col::new("done")];
        COLS
    }

    fn values(&self) -> Vec<(Col, Value)> {
        vec![
            (Col::new("id"), self.id.into()),
            (Col::new("title"), self.title.as_str().into()),
            (Col::new("done"), self.done.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id"),
            title: row.get_str("title").unwrap_or_default().to_string(),
            done: row.get_bool("done").unwrap_or(false),
        })
    }
}

#[test]
fn record_round_trip() -> Result<()> {
    let db = SqliteDatabase::open_in_memory()?;
    db.executescript("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT, done INTEGER)")?;

    let todo = Todo {
        id: None,
        title: "write tests".to_string(),
        done: false,
    };
    let key = db.insert_record(&todo)?.expect("sqlite reports a rowid");

    let fetched: Todo = db
        .fetchone_as(("id", key.clone()))?
        .expect("inserted row comes back");
    assert_eq!(fetched.id, key.as_i64());
    assert_eq!(fetched.title, todo.title);
    assert_eq!(fetched.done, todo.done);

    let all: Vec<Todo> = db.fetchall_as(())?;
    assert_eq!(all.len(), 1);

    Ok(())
}

#[test]
fn reserved_record_columns_are_auto_quoted() -> Result<()> {
    struct Entry {
        order: i64,
    }

    impl Record for Entry {
        const TABLE: &'static str = "entries";

        fn columns() -> &'static [Col] {
            const COLS: &[Col] = &[Col::new("order")];
            COLS
        }

        fn values(&self) -> Vec<(Col, Value)> {
            vec![(Col::new("order"), self.order.into())]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                order: row.get_i64("order").unwrap_or_default(),
            })
        }
    }

    let db = SqliteDatabase::open_in_memory()?;
    db.executescript("CREATE TABLE entries (\"order\" INTEGER)")?;

    db.insert_record(&Entry { order: 9 })?;
    let got: Entry = db.fetchone_as(())?.expect("row exists");
    assert_eq!(got.order, 9);

    Ok(())
}

// ---------------------------------------------------------------------------
// Type registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Payload(serde_json::Value);

#[test]
fn adapter_and_converter_round_trip_json() -> Result<()> {
    let _guard = REGISTRY_LOCK.lock().unwrap();
    registry::reset();

    register_adapter(|p: &Payload| Value::Text(p.0.to_string()));
    register_converter("JSON", |v| {
        Ok(Value::Json(v.as_str().unwrap_or_default().to_string()))
    });

    let db = SqliteDatabase::open_in_memory()?;
    db.executescript("CREATE TABLE docs (id INTEGER PRIMARY KEY, doc JSON)")?;

    let payload = Payload(serde_json::json!({"a": [1, 2]}));
    db.insert(
        "docs",
        unidb_core::Values::new().set_adapted("doc", &payload)?,
    )?;

    let row = db.fetchone("docs", ())?.expect("row exists");
    let doc = row.get("doc").expect("doc column present");
    assert!(matches!(doc, Value::Json(_)));
    assert_eq!(doc.as_json(), Some(payload.0.clone()));

    registry::reset();
    Ok(())
}

#[test]
fn database_row_factory_overrides_mapping() -> Result<()> {
    let db = open_db()?;
    db.insert("t", ("val", "a"))?;

    db.set_row_factory(|pairs| {
        let mut row = Row::new();
        for (name, value) in pairs {
            row.set(name.to_ascii_uppercase(), value);
        }
        row
    });

    let row = db.fetchone("t", ())?.expect("row exists");
    assert!(row.get("VAL").is_some());
    assert!(row.get("val").is_none());

    Ok(())
}

#[test]
fn decltype_tags_reach_converters_only_when_enabled() -> Result<()> {
    let _guard = REGISTRY_LOCK.lock().unwrap();
    registry::reset();
    register_converter("SLUG", |v| {
        Ok(Value::Text(format!(
            "converted:{}",
            v.as_str().unwrap_or_default()
        )))
    });

    let db = SqliteDatabase::open_in_memory()?;
    db.executescript("CREATE TABLE s (id INTEGER PRIMARY KEY, val SLUG)")?;
    db.insert("s", ("val", "x"))?;
    let row = db.fetchone("s", ())?.expect("row exists");
    assert_eq!(row.get_str("val"), Some("converted:x"));

    let plain = SqliteDatabase::open_with(
        ":memory:",
        unidb_engine_sqlite::OpenOptions {
            parse_decltypes: false,
        },
    )?;
    plain.executescript("CREATE TABLE s (id INTEGER PRIMARY KEY, val SLUG)")?;
    plain.insert("s", ("val", "x"))?;
    let row = plain.fetchone("s", ())?.expect("row exists");
    assert_eq!(row.get_str("val"), Some("x"));

    registry::reset();
    Ok(())
}
