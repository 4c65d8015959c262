use crate::Value;

/// Placeholder style for parameterized queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` placeholders in textual order (SQLite).
    QuestionMark,
    /// `$1`, `$2`, … in parameter-append order (PostgreSQL).
    DollarNumber,
}

/// Backend family a dialect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Embedded file/memory engine.
    Sqlite,
    /// Networked client-server engine.
    Postgres,
}

/// Engine-specific SQL surface (quoting, placeholders, literals, RETURNING).
pub trait Dialect: Send + Sync {
    /// Short engine name as used by the engine registry.
    fn name(&self) -> &'static str;

    fn engine(&self) -> EngineKind;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Render the placeholder for the `n`-th parameter (1-based).
    fn placeholder(&self, n: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::DollarNumber => format!("${}", n),
        }
    }

    /// Quote an identifier unconditionally. Idempotent: already-quoted
    /// input is returned unchanged.
    fn quote_identifier(&self, name: &str) -> String {
        if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            return name.to_string();
        }
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Whether an identifier arriving from a record binding must be quoted.
    ///
    /// Plain-string identifiers are never run through this predicate; the
    /// caller owns those verbatim.
    fn needs_quoting(&self, name: &str) -> bool {
        name.is_empty()
            || name
                .chars()
                .next()
                .is_some_and(|c| !c.is_ascii_alphabetic() && c != '_')
            || name.chars().any(|c| !c.is_ascii_alphanumeric() && c != '_')
            || is_reserved_word(name)
    }

    /// Whether INSERT can carry a `RETURNING` clause for the primary key.
    fn supports_returning(&self) -> bool {
        false
    }

    /// Whether `OFFSET` may appear without a `LIMIT` clause. Dialects that
    /// disallow it get `LIMIT -1 OFFSET n` instead.
    fn bare_offset(&self) -> bool {
        true
    }

    /// Convert a Value to a SQL literal string. Used where parameters cannot
    /// be bound (server-side cursor declarations).
    fn value_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_nan() || f.is_infinite() {
                    "NULL".to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) | Value::Json(s) => format!("'{}'", self.escape_string(s)),
            Value::Decimal(s) => s.clone(),
            Value::Bytes(b) => format!("X'{}'", hex::encode(b)),
            Value::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
        }
    }

    /// Escape a string for use inside a single-quoted literal.
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }
}

/// ANSI-conventions dialect: double-quote identifiers, `?` placeholders.
/// The embedded and networked dialects live with their engines; this one
/// backs generic tooling and tests.
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
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

/// ANSI core reserved words, uppercased and sorted for binary search.
///
/// Used by the `needs_quoting` predicate for record-bound identifiers only;
/// plain-string identifiers pass through verbatim.
static RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ALTER",
    "AND",
    "ANY",
    "AS",
    "ASC",
    "BETWEEN",
    "BY",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CROSS",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "DEFAULT",
    "DELETE",
    "DESC",
    "DISTINCT",
    "DROP",
    "ELSE",
    "END",
    "EXCEPT",
    "EXISTS",
    "FOREIGN",
    "FROM",
    "FULL",
    "GROUP",
    "HAVING",
    "IN",
    "INDEX",
    "INNER",
    "INSERT",
    "INTERSECT",
    "INTO",
    "IS",
    "JOIN",
    "LEFT",
    "LIKE",
    "LIMIT",
    "NATURAL",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "OR",
    "ORDER",
    "OUTER",
    "PRIMARY",
    "REFERENCES",
    "RIGHT",
    "SELECT",
    "SET",
    "TABLE",
    "THEN",
    "TO",
    "UNION",
    "UNIQUE",
    "UPDATE",
    "USING",
    "VALUES",
    "WHEN",
    "WHERE",
    "WITH",
];

pub fn is_reserved_word(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    RESERVED_WORDS.binary_search(&upper.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_words_are_sorted() {
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }

    #[test]
    fn quote_is_idempotent() {
        let dialect = AnsiDialect;
        assert_eq!(dialect.quote_identifier("name"), "\"name\"");
        assert_eq!(dialect.quote_identifier("\"name\""), "\"name\"");
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn needs_quoting_for_reserved_and_odd_names() {
        let dialect = AnsiDialect;
        assert!(dialect.needs_quoting("select"));
        assert!(dialect.needs_quoting("my column"));
        assert!(dialect.needs_quoting("2fast"));
        assert!(!dialect.needs_quoting("plain_name"));
    }
}
