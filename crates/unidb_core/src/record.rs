use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Column descriptor declared by a [`Record`] implementation.
///
/// Descriptors carry the declared column name as static data; names that
/// reach the assembler through a descriptor are subject to automatic
/// quoting and, on the networked engine, casing resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Col {
    pub name: &'static str,
}

impl Col {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl std::fmt::Display for Col {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// A user-defined record type standing in for a table.
///
/// The table name and column set are static metadata computed once per type;
/// no instance is constructed by the binder except when materializing a
/// result row through [`Record::from_row`].
///
/// ```
/// use unidb_core::{Col, Record, Row, Value};
///
/// struct Todo {
///     id: Option<i64>,
///     title: String,
/// }
///
/// impl Record for Todo {
///     const TABLE: &'static str = "todos";
///
///     fn columns() -> &'static [Col] {
///         const COLS: &[Col] = &[Col::new("id"), Col::new("title")];
///         COLS
///     }
///
///     fn values(&self) -> Vec<(Col, Value)> {
///         vec![
///             (Col::new("id"), self.id.into()),
///             (Col::new("title"), self.title.as_str().into()),
///         ]
///     }
///
///     fn from_row(row: &Row) -> unidb_core::Result<Self> {
///         Ok(Self {
///             id: row.get_i64("id"),
///             title: row.get_str("title").unwrap_or_default().to_string(),
///         })
///     }
/// }
/// ```
pub trait Record: Sized {
    /// Table this record maps to.
    const TABLE: &'static str;

    /// Declared columns in declaration order.
    fn columns() -> &'static [Col];

    /// Extract `(column, value)` pairs from an instance. `Null` fields are
    /// preserved, not skipped.
    fn values(&self) -> Vec<(Col, Value)>;

    /// Materialize an instance from a result row.
    fn from_row(row: &Row) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        key: String,
        val: Option<i64>,
    }

    impl Record for Pair {
        const TABLE: &'static str = "pairs";

        fn columns() -> &'static [Col] {
            const COLS: &[Col] = &[Col::new("key"), Col::new("val")];
            COLS
        }

        fn values(&self) -> Vec<(Col, Value)> {
            vec![
                (Col::new("key"), self.key.as_str().into()),
                (Col::new("val"), self.val.into()),
            ]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                key: row.get_str("key").unwrap_or_default().to_string(),
                val: row.get_i64("val"),
            })
        }
    }

    #[test]
    fn null_fields_are_preserved() {
        let pair = Pair {
            key: "k".into(),
            val: None,
        };
        let values = pair.values();
        assert_eq!(values[1].1, Value::Null);
    }

    #[test]
    fn columns_are_declaration_ordered() {
        let names: Vec<&str> = Pair::columns().iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["key", "val"]);
    }
}
