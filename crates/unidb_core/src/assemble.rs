//! Pure SQL assembly: structured arguments in, `(sql, params)` out.
//!
//! Nothing here performs I/O. Schema knowledge (canonical casing, parameter
//! casts, primary keys) is injected through [`ColumnResolver`], which the
//! networked engine backs with its schema cache and everything else leaves
//! at the no-op default.

use crate::argument::{Clause, CmpOp, ColumnRef, Columns, Filter, Query, Target, Values};
use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::{DbError, Result};
use crate::registry;
use crate::value::Value;

/// An assembled statement ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Whether the statement carries a `RETURNING` clause whose single cell
    /// is the inserted primary key.
    pub returning: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            returning: false,
        }
    }

    /// Single-line preview for logging.
    pub fn preview(&self) -> String {
        let flat = self.sql.replace('\n', " ");
        if flat.len() > 120 {
            let truncated: String = flat.chars().take(120).collect();
            format!("{}...", truncated)
        } else {
            flat
        }
    }
}

/// Schema knowledge injected into assembly.
///
/// `table` is the target name exactly as the caller supplied it, before
/// prefixing or quoting.
pub trait ColumnResolver {
    /// Canonically-cased form of a column name, when the schema knows better.
    fn resolve_column(&self, table: &str, name: &str) -> Option<String> {
        let _ = (table, name);
        None
    }

    /// Declared type of a column, used to render `$N::<type>` casts when a
    /// converter is registered for that type.
    fn column_cast(&self, table: &str, name: &str) -> Option<String> {
        let _ = (table, name);
        None
    }

    /// Primary key column of a table, for the INSERT `RETURNING` clause.
    fn primary_key(&self, table: &str) -> Option<String> {
        let _ = table;
        None
    }
}

/// Resolver with no schema knowledge (embedded engine, tests).
pub struct NoResolver;

impl ColumnResolver for NoResolver {}

struct SqlWriter<'a> {
    dialect: &'a dyn Dialect,
    resolver: &'a dyn ColumnResolver,
    table: &'a str,
    sql: String,
    params: Vec<Value>,
}

impl<'a> SqlWriter<'a> {
    fn new(dialect: &'a dyn Dialect, resolver: &'a dyn ColumnResolver, table: &'a str) -> Self {
        Self {
            dialect,
            resolver,
            table,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Append a placeholder bound to `value`, with no column context.
    fn push_param(&mut self, value: Value) {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    /// Append a placeholder bound to `value` for a known column, rendering a
    /// `::type` cast when the declared type has an active converter.
    fn push_param_for(&mut self, col: &ColumnRef, value: Value) {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);

        if let Some(decl) = self.resolver.column_cast(self.table, &col.name)
            && registry::has_converter(&decl)
        {
            self.sql.push_str("::");
            self.sql.push_str(&decl);
        }
    }

    /// Render a column reference: verbatim for plain strings, resolved and
    /// auto-quoted for bound names.
    fn column(&self, col: &ColumnRef) -> String {
        if !col.bound {
            return col.name.clone();
        }
        let resolved = self
            .resolver
            .resolve_column(self.table, &col.name)
            .unwrap_or_else(|| col.name.clone());
        if self.dialect.needs_quoting(&resolved) {
            self.dialect.quote_identifier(&resolved)
        } else {
            resolved
        }
    }

    fn write_where(&mut self, filter: &Filter) -> Result<()> {
        if filter.is_empty() {
            return Ok(());
        }

        self.push(" WHERE ");
        for (i, clause) in filter.clauses.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.write_clause(clause)?;
        }
        Ok(())
    }

    fn write_clause(&mut self, clause: &Clause) -> Result<()> {
        match clause {
            Clause::Eq(col, Value::Null) => {
                let col_sql = self.column(col);
                self.push(&col_sql);
                self.push(" IS NULL");
            }
            Clause::Eq(col, value) => {
                let col_sql = self.column(col);
                self.push(&col_sql);
                self.push(" = ");
                self.push_param_for(col, value.clone());
            }
            Clause::Cmp(col, CmpOp::Is, Value::Null) => {
                let col_sql = self.column(col);
                self.push(&col_sql);
                self.push(" IS NULL");
            }
            Clause::Cmp(col, CmpOp::IsNot, Value::Null) => {
                let col_sql = self.column(col);
                self.push(&col_sql);
                self.push(" IS NOT NULL");
            }
            Clause::Cmp(col, op, value) => {
                let col_sql = self.column(col);
                self.push(&col_sql);
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.push_param_for(col, value.clone());
            }
            Clause::In(col, values) => self.write_in(col, values, false),
            Clause::NotIn(col, values) => self.write_in(col, values, true),
            Clause::Expr(raw, params) => {
                self.push("(");
                let rendered = self.renumber(raw, params.len())?;
                self.push(&rendered);
                self.push(")");
                self.params.extend(params.iter().cloned());
            }
        }
        Ok(())
    }

    fn write_in(&mut self, col: &ColumnRef, values: &[Value], negated: bool) {
        let col_sql = self.column(col);
        self.push(&col_sql);
        self.push(if negated { " NOT IN (" } else { " IN (" });

        if values.is_empty() {
            // Empty lists keep their tautology: IN (NULL) is never true,
            // NOT IN (NULL) is never false.
            self.push("NULL");
        } else {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.push_param_for(col, value.clone());
            }
        }
        self.push(")");
    }

    /// Rewrite the `?` placeholders of a raw fragment for the dialect,
    /// numbering them after the parameters already appended.
    fn renumber(&self, raw: &str, param_count: usize) -> Result<String> {
        let mut seen = 0;
        let out = match self.dialect.placeholder_style() {
            PlaceholderStyle::QuestionMark => {
                seen = raw
                    .chars()
                    .scan(false, |in_string, c| {
                        if c == '\'' {
                            *in_string = !*in_string;
                        }
                        Some((c == '?' && !*in_string) as usize)
                    })
                    .sum();
                raw.to_string()
            }
            PlaceholderStyle::DollarNumber => {
                let mut out = String::with_capacity(raw.len());
                let mut in_string = false;
                for c in raw.chars() {
                    if c == '\'' {
                        in_string = !in_string;
                    }
                    if c == '?' && !in_string {
                        seen += 1;
                        out.push_str(&self.dialect.placeholder(self.params.len() + seen));
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        };

        if seen != param_count {
            return Err(DbError::bad_argument(format!(
                "expression has {seen} placeholders but {param_count} parameters"
            )));
        }
        Ok(out)
    }

    fn into_statement(self) -> Statement {
        Statement::new(self.sql, self.params)
    }
}

/// Render the table reference: schema prefix for unqualified names, quoting
/// for bound names that need it.
fn table_sql(dialect: &dyn Dialect, schema_prefix: Option<&str>, target: &Target) -> String {
    let name = target.table_name();

    let rendered = if target.is_bound() && dialect.needs_quoting(name) {
        dialect.quote_identifier(name)
    } else {
        name.to_string()
    };

    match schema_prefix {
        Some(prefix) if !name.contains('.') => format!("{prefix}.{rendered}"),
        _ => rendered,
    }
}

pub fn assemble_select(
    dialect: &dyn Dialect,
    resolver: &dyn ColumnResolver,
    schema_prefix: Option<&str>,
    target: &Target,
    query: &Query,
) -> Result<Statement> {
    let table = target.table_name().to_string();
    let mut w = SqlWriter::new(dialect, resolver, &table);

    w.push("SELECT ");
    match &query.columns {
        Columns::All => w.push("*"),
        Columns::Raw(raw) => w.push(raw),
        Columns::List(cols) => {
            let rendered: Vec<String> = cols.iter().map(|c| w.column(c)).collect();
            w.push(&rendered.join(", "));
        }
    }

    w.push(" FROM ");
    let table_ref = table_sql(dialect, schema_prefix, target);
    w.push(&table_ref);

    w.write_where(&query.filter)?;

    if !query.group.is_empty() {
        w.push(" GROUP BY ");
        let rendered: Vec<String> = query.group.columns.iter().map(|c| w.column(c)).collect();
        w.push(&rendered.join(", "));
    }

    if !query.order.is_empty() {
        w.push(" ORDER BY ");
        let rendered: Vec<String> = query
            .order
            .terms
            .iter()
            .map(|(col, dir)| format!("{} {}", w.column(col), dir.as_sql()))
            .collect();
        w.push(&rendered.join(", "));
    }

    match (query.limit.limit, query.limit.offset) {
        (Some(limit), Some(offset)) => {
            w.push(&format!(" LIMIT {limit} OFFSET {offset}"));
        }
        (Some(limit), None) => {
            w.push(&format!(" LIMIT {limit}"));
        }
        (None, Some(offset)) => {
            if dialect.bare_offset() {
                w.push(&format!(" OFFSET {offset}"));
            } else {
                w.push(&format!(" LIMIT -1 OFFSET {offset}"));
            }
        }
        (None, None) => {}
    }

    Ok(w.into_statement())
}

pub fn assemble_insert(
    dialect: &dyn Dialect,
    resolver: &dyn ColumnResolver,
    schema_prefix: Option<&str>,
    target: &Target,
    values: &Values,
) -> Result<Statement> {
    if values.is_empty() {
        return Err(DbError::bad_argument("INSERT requires a non-empty VALUES"));
    }

    let table = target.table_name().to_string();
    let mut w = SqlWriter::new(dialect, resolver, &table);

    w.push("INSERT INTO ");
    let table_ref = table_sql(dialect, schema_prefix, target);
    w.push(&table_ref);

    w.push(" (");
    let rendered: Vec<String> = values.pairs.iter().map(|(c, _)| w.column(c)).collect();
    w.push(&rendered.join(", "));
    w.push(") VALUES (");
    for (i, (col, value)) in values.pairs.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_param_for(col, value.clone());
    }
    w.push(")");

    let mut stmt = w.into_statement();
    if dialect.supports_returning()
        && let Some(pk) = resolver.primary_key(&table)
    {
        let pk_sql = if dialect.needs_quoting(&pk) {
            dialect.quote_identifier(&pk)
        } else {
            pk
        };
        stmt.sql.push_str(" RETURNING ");
        stmt.sql.push_str(&pk_sql);
        stmt.returning = true;
    }
    Ok(stmt)
}

pub fn assemble_update(
    dialect: &dyn Dialect,
    resolver: &dyn ColumnResolver,
    schema_prefix: Option<&str>,
    target: &Target,
    values: &Values,
    filter: &Filter,
) -> Result<Statement> {
    if values.is_empty() {
        return Err(DbError::bad_argument("UPDATE requires a non-empty VALUES"));
    }

    let table = target.table_name().to_string();
    let mut w = SqlWriter::new(dialect, resolver, &table);

    w.push("UPDATE ");
    let table_ref = table_sql(dialect, schema_prefix, target);
    w.push(&table_ref);
    w.push(" SET ");

    for (i, (col, value)) in values.pairs.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        let col_sql = w.column(col);
        w.push(&col_sql);
        w.push(" = ");
        w.push_param_for(col, value.clone());
    }

    w.write_where(filter)?;
    Ok(w.into_statement())
}

pub fn assemble_delete(
    dialect: &dyn Dialect,
    resolver: &dyn ColumnResolver,
    schema_prefix: Option<&str>,
    target: &Target,
    filter: &Filter,
) -> Result<Statement> {
    let table = target.table_name().to_string();
    let mut w = SqlWriter::new(dialect, resolver, &table);

    w.push("DELETE FROM ");
    let table_ref = table_sql(dialect, schema_prefix, target);
    w.push(&table_ref);

    w.write_where(filter)?;
    Ok(w.into_statement())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::{Filter, Order};
    use crate::dialect::{AnsiDialect, EngineKind};
    use crate::record::Col;

    static DIALECT: AnsiDialect = AnsiDialect;

    /// Dollar-number dialect with RETURNING, standing in for the networked
    /// engine in pure-assembly tests.
    struct DollarDialect;

    impl Dialect for DollarDialect {
        fn name(&self) -> &'static str {
            "dollar"
        }

        fn engine(&self) -> EngineKind {
            EngineKind::Postgres
        }

        fn placeholder_style(&self) -> PlaceholderStyle {
            PlaceholderStyle::DollarNumber
        }

        fn supports_returning(&self) -> bool {
            true
        }
    }

    struct FixedResolver;

    impl ColumnResolver for FixedResolver {
        fn resolve_column(&self, _table: &str, name: &str) -> Option<String> {
            (name == "wideval").then(|| "WideVal".to_string())
        }

        fn primary_key(&self, table: &str) -> Option<String> {
            (table == "t").then(|| "id".to_string())
        }
    }

    fn count_placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    fn select(target: impl Into<Target>, query: Query) -> Statement {
        assemble_select(&DIALECT, &NoResolver, None, &target.into(), &query).unwrap()
    }

    #[test]
    fn bare_select() {
        let stmt = select("t", Query::new());
        assert_eq!(stmt.sql, "SELECT * FROM t");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn placeholder_count_matches_params() {
        let stmt = select(
            "t",
            Query::new()
                .eq("a", 1)
                .filter(Filter::new().is_in("b", [1, 2, 3]))
                .filter(Filter::new().expr("c < ? OR c > ?", [0, 9])),
        );
        assert_eq!(count_placeholders(&stmt.sql), stmt.params.len());
        assert_eq!(stmt.params.len(), 6);
    }

    #[test]
    fn assembly_is_pure() {
        let query = Query::new().eq("a", 1).order_by("a").limit(3_i64);
        let first = select("t", query.clone());
        let second = select("t", query);
        assert_eq!(first, second);
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let stmt = select("t", Query::new().eq("val", Value::Null));
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE val IS NULL");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn comparison_operators() {
        let stmt = select(
            "t",
            Query::from(Filter::new().cmp("id", "<", 5).unwrap()),
        );
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE id < ?");
        assert_eq!(stmt.params, vec![Value::Int(5)]);

        let stmt = select("t", Query::from(Filter::new().is_not_null("val")));
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE val IS NOT NULL");
    }

    #[test]
    fn in_expansion_preserves_order() {
        let stmt = select("t", Query::from(Filter::new().is_in("c", [3, 1, 2])));
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE c IN (?, ?, ?)");
        assert_eq!(
            stmt.params,
            vec![Value::Int(3), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn empty_in_keeps_tautology() {
        let stmt = select(
            "t",
            Query::from(Filter::new().is_in("c", Vec::<Value>::new())),
        );
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE c IN (NULL)");

        let stmt = select(
            "t",
            Query::from(Filter::new().not_in("c", Vec::<Value>::new())),
        );
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE c NOT IN (NULL)");
    }

    #[test]
    fn raw_expression_is_parenthesized() {
        let stmt = select(
            "t",
            Query::new()
                .filter(Filter::new().expr("id < ? OR id > ?", [1, 2]))
                .eq("val", "a"),
        );
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t WHERE (id < ? OR id > ?) AND val = ?"
        );
        assert_eq!(
            stmt.params,
            vec![Value::Int(1), Value::Int(2), Value::Text("a".into())]
        );
    }

    #[test]
    fn expression_placeholder_mismatch_is_rejected() {
        let result = assemble_select(
            &DIALECT,
            &NoResolver,
            None,
            &Target::from("t"),
            &Query::from(Filter::new().expr("id < ?", [1, 2])),
        );
        assert!(matches!(result, Err(DbError::BadArgument(_))));
    }

    #[test]
    fn order_direction_equivalences() {
        let expected = "SELECT * FROM t ORDER BY c ASC";
        for order in [
            Order::from("c"),
            Order::from("c ASC"),
            Order::from(("c", true)),
            Order::new().by("c"),
        ] {
            let stmt = select("t", Query::new().order_by(order));
            assert_eq!(stmt.sql, expected);
        }

        let expected = "SELECT * FROM t ORDER BY c DESC";
        for order in [
            Order::from("c DESC"),
            Order::from(("c", false)),
            Order::new().by_desc("c"),
        ] {
            let stmt = select("t", Query::new().order_by(order));
            assert_eq!(stmt.sql, expected);
        }
    }

    #[test]
    fn multi_term_order_preserves_insertion() {
        let stmt = select("t", Query::new().order_by(Order::new().by("a").by_desc("b")));
        assert_eq!(stmt.sql, "SELECT * FROM t ORDER BY a ASC, b DESC");
    }

    #[test]
    fn group_by_and_columns() {
        let stmt = select(
            "t",
            Query::new().columns("kind, COUNT(*)").group_by("kind"),
        );
        assert_eq!(stmt.sql, "SELECT kind, COUNT(*) FROM t GROUP BY kind");
    }

    #[test]
    fn limit_offset_forms() {
        let stmt = select("t", Query::new().limit(10_i64));
        assert_eq!(stmt.sql, "SELECT * FROM t LIMIT 10");

        let stmt = select("t", Query::new().limit((10, 20)));
        assert_eq!(stmt.sql, "SELECT * FROM t LIMIT 10 OFFSET 20");

        let stmt = select("t", Query::new().limit((-1, 20)));
        assert_eq!(stmt.sql, "SELECT * FROM t LIMIT -1 OFFSET 20");

        let stmt = select("t", Query::new().limit((-1, -1)));
        assert_eq!(stmt.sql, "SELECT * FROM t");
    }

    #[test]
    fn bare_offset_on_bare_offset_dialects() {
        let stmt = assemble_select(
            &DollarDialect,
            &NoResolver,
            None,
            &Target::from("t"),
            &Query::new().offset(20),
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t OFFSET 20");
    }

    #[test]
    fn dollar_placeholders_number_in_append_order() {
        let stmt = assemble_select(
            &DollarDialect,
            &NoResolver,
            None,
            &Target::from("t"),
            &Query::new()
                .eq("a", 1)
                .filter(Filter::new().expr("b < ? OR b > ?", [2, 3]))
                .eq("c", 4),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t WHERE a = $1 AND (b < $2 OR b > $3) AND c = $4"
        );
        assert_eq!(stmt.params.len(), 4);
    }

    #[test]
    fn bound_names_are_quoted_only_when_needed() {
        let stmt = select(
            "t",
            Query::new()
                .columns(Columns::List(vec![
                    Col::new("plain").into(),
                    Col::new("select").into(),
                    Col::new("two words").into(),
                ]))
                .eq(Col::new("order"), 1),
        );
        assert_eq!(
            stmt.sql,
            "SELECT plain, \"select\", \"two words\" FROM t WHERE \"order\" = ?"
        );
    }

    #[test]
    fn plain_strings_are_never_quoted() {
        let stmt = select("t", Query::new().columns("select").eq("order", 1));
        assert_eq!(stmt.sql, "SELECT select FROM t WHERE order = ?");
    }

    #[test]
    fn resolver_supplies_declared_casing() {
        let stmt = assemble_select(
            &DollarDialect,
            &FixedResolver,
            None,
            &Target::from("t"),
            &Query::new().eq(Col::new("wideval"), 1),
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE \"WideVal\" = $1");
    }

    #[test]
    fn insert_shapes() {
        let stmt = assemble_insert(
            &DIALECT,
            &NoResolver,
            None,
            &Target::from("t"),
            &Values::new().set("a", 1).set("b", "x"),
        )
        .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (a, b) VALUES (?, ?)");
        assert!(!stmt.returning);

        let err = assemble_insert(
            &DIALECT,
            &NoResolver,
            None,
            &Target::from("t"),
            &Values::new(),
        );
        assert!(matches!(err, Err(DbError::BadArgument(_))));
    }

    #[test]
    fn insert_returning_primary_key() {
        let stmt = assemble_insert(
            &DollarDialect,
            &FixedResolver,
            None,
            &Target::from("t"),
            &Values::new().set("a", 1),
        )
        .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (a) VALUES ($1) RETURNING id");
        assert!(stmt.returning);

        // Unknown table: no RETURNING.
        let stmt = assemble_insert(
            &DollarDialect,
            &FixedResolver,
            None,
            &Target::from("unknown"),
            &Values::new().set("a", 1),
        )
        .unwrap();
        assert!(!stmt.returning);
    }

    #[test]
    fn update_and_delete_shapes() {
        let stmt = assemble_update(
            &DIALECT,
            &NoResolver,
            None,
            &Target::from("t"),
            &Values::new().set("val", "z"),
            &Filter::new().eq("id", 2),
        )
        .unwrap();
        assert_eq!(stmt.sql, "UPDATE t SET val = ? WHERE id = ?");
        assert_eq!(stmt.params, vec![Value::Text("z".into()), Value::Int(2)]);

        let stmt = assemble_delete(
            &DIALECT,
            &NoResolver,
            None,
            &Target::from("t"),
            &Filter::new().eq("id", 2),
        )
        .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM t WHERE id = ?");

        let err = assemble_update(
            &DIALECT,
            &NoResolver,
            None,
            &Target::from("t"),
            &Values::new(),
            &Filter::new(),
        );
        assert!(matches!(err, Err(DbError::BadArgument(_))));
    }

    #[test]
    fn schema_prefix_applies_to_unqualified_names() {
        let stmt = assemble_select(
            &DIALECT,
            &NoResolver,
            Some("aux"),
            &Target::from("t"),
            &Query::new(),
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM aux.t");

        let stmt = assemble_select(
            &DIALECT,
            &NoResolver,
            Some("aux"),
            &Target::from("other.t"),
            &Query::new(),
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM other.t");
    }
}
