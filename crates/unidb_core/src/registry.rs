//! Process-wide type registry: host-type adapters, declared-type converters,
//! and the optional row factory.
//!
//! All three registries are lock-protected and safe to mutate from any
//! thread. `reset()` restores the pristine state between tests.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{DbError, Result};
use crate::row::Row;
use crate::value::Value;

/// Marshal a host value into an engine-acceptable [`Value`].
type AdapterFn = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;

/// Unmarshal a result cell tagged with a declared column type.
type ConverterFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Materialize a caller-visible row from named cells.
pub type RowFactory = Arc<dyn Fn(Vec<(String, Value)>) -> Row + Send + Sync>;

static ADAPTERS: LazyLock<RwLock<HashMap<TypeId, AdapterFn>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static CONVERTERS: LazyLock<RwLock<HashMap<String, ConverterFn>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static ROW_FACTORY: LazyLock<RwLock<Option<RowFactory>>> = LazyLock::new(|| RwLock::new(None));

/// Register an adapter for host type `T`. Replaces any previous adapter for
/// the same type; multiple host types may share one function.
pub fn register_adapter<T: Any>(adapter: impl Fn(&T) -> Value + Send + Sync + 'static) {
    let wrapped: AdapterFn = Arc::new(move |any| {
        let value = any
            .downcast_ref::<T>()
            .expect("adapter invoked with a mismatched host type");
        adapter(value)
    });
    ADAPTERS
        .write()
        .expect("adapter registry poisoned")
        .insert(TypeId::of::<T>(), wrapped);
    log::debug!("registered adapter for {}", type_name::<T>());
}

/// Register a converter for a declared column type tag. The tag is matched
/// against the uppercased declared type as it appears in the column
/// declaration, with any length suffix stripped (`VARCHAR(16)` → `VARCHAR`).
pub fn register_converter(
    type_tag: &str,
    converter: impl Fn(Value) -> Result<Value> + Send + Sync + 'static,
) {
    let tag = normalize_tag(type_tag);
    CONVERTERS
        .write()
        .expect("converter registry poisoned")
        .insert(tag.clone(), Arc::new(converter));
    log::debug!("registered converter for {tag}");
}

/// Register the process-wide row factory.
pub fn register_row_factory(factory: impl Fn(Vec<(String, Value)>) -> Row + Send + Sync + 'static) {
    *ROW_FACTORY.write().expect("row factory registry poisoned") = Some(Arc::new(factory));
}

/// Run a host value through its registered adapter.
pub fn adapt<T: Any>(value: &T) -> Result<Value> {
    let adapters = ADAPTERS.read().expect("adapter registry poisoned");
    match adapters.get(&TypeId::of::<T>()) {
        Some(adapter) => Ok(adapter(value)),
        None => Err(DbError::bad_argument(format!(
            "no adapter registered for {}",
            type_name::<T>()
        ))),
    }
}

/// Whether any adapter is registered for `T`.
pub fn has_adapter<T: Any>() -> bool {
    ADAPTERS
        .read()
        .expect("adapter registry poisoned")
        .contains_key(&TypeId::of::<T>())
}

/// Run a result cell through the converter for its declared type tag, if one
/// is registered. Cells with an unknown or absent tag pass through.
pub fn convert(type_tag: Option<&str>, value: Value) -> Result<Value> {
    let Some(tag) = type_tag else {
        return Ok(value);
    };
    let converters = CONVERTERS.read().expect("converter registry poisoned");
    match converters.get(&normalize_tag(tag)) {
        Some(converter) => converter(value),
        None => Ok(value),
    }
}

/// Whether a converter is registered for the tag. Drives `$N::type` casts on
/// the networked engine.
pub fn has_converter(type_tag: &str) -> bool {
    CONVERTERS
        .read()
        .expect("converter registry poisoned")
        .contains_key(&normalize_tag(type_tag))
}

/// The process-wide row factory, if registered.
pub fn row_factory() -> Option<RowFactory> {
    ROW_FACTORY
        .read()
        .expect("row factory registry poisoned")
        .clone()
}

/// Clear all registries. Test hook.
pub fn reset() {
    ADAPTERS.write().expect("adapter registry poisoned").clear();
    CONVERTERS
        .write()
        .expect("converter registry poisoned")
        .clear();
    *ROW_FACTORY.write().expect("row factory registry poisoned") = None;
}

fn normalize_tag(tag: &str) -> String {
    let head = tag.split('(').next().unwrap_or(tag);
    head.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The registries are process-wide; serialize the tests that touch them.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[derive(Debug)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[test]
    fn adapter_dispatches_by_type() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        register_adapter(|p: &Point| Value::Text(format!("{},{}", p.x, p.y)));

        let value = adapt(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(value, Value::Text("1,2".into()));

        assert!(adapt(&"unregistered").is_err());
        reset();
    }

    #[test]
    fn converter_matches_normalized_tag() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        register_converter("json", |v| {
            Ok(Value::Json(v.as_str().unwrap_or_default().to_string()))
        });

        assert!(has_converter("JSON"));
        assert!(has_converter("json(16)"));

        let converted = convert(Some("JSON"), Value::Text("[1]".into())).unwrap();
        assert_eq!(converted, Value::Json("[1]".into()));

        let passthrough = convert(Some("TEXT"), Value::Text("x".into())).unwrap();
        assert_eq!(passthrough, Value::Text("x".into()));
        reset();
    }

    #[test]
    fn untagged_cells_pass_through() {
        let _guard = TEST_LOCK.lock().unwrap();
        let value = convert(None, Value::Int(1)).unwrap();
        assert_eq!(value, Value::Int(1));
    }
}
