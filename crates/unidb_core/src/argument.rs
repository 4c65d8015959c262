//! Canonical forms of the structured query arguments.
//!
//! The public operations accept flexible shapes (strings, tuples, column
//! descriptors, builder chains) and normalize everything here, before the
//! assembler ever sees it. The assembler consumes only these types.

use crate::error::{DbError, Result};
use crate::record::{Col, Record};
use crate::value::Value;

/// A column reference, tracking whether it arrived through a record binding.
///
/// Plain strings are emitted verbatim; bound names are auto-quoted per the
/// dialect's predicate and resolved against the schema cache on the
/// networked engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub name: String,
    pub bound: bool,
}

impl ColumnRef {
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: false,
        }
    }

    pub fn bound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: true,
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::raw(name)
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::raw(name)
    }
}

impl From<Col> for ColumnRef {
    fn from(col: Col) -> Self {
        ColumnRef::bound(col.name)
    }
}

/// Target of an operation: a verbatim table name or a bound record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Table(String),
    Record {
        table: &'static str,
        columns: &'static [Col],
    },
}

impl Target {
    pub fn record<R: Record>() -> Self {
        Target::Record {
            table: R::TABLE,
            columns: R::columns(),
        }
    }

    /// The name as supplied, before quoting or prefixing.
    pub fn table_name(&self) -> &str {
        match self {
            Target::Table(name) => name,
            Target::Record { table, .. } => table,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Target::Record { .. })
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Table(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Table(name)
    }
}

/// Projected columns of a SELECT.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Columns {
    /// `*`
    #[default]
    All,
    /// Raw SQL fragment, passed through (`"COUNT(*)"`, `"a, b"`).
    Raw(String),
    /// Ordered column list.
    List(Vec<ColumnRef>),
}

impl From<&str> for Columns {
    fn from(raw: &str) -> Self {
        Columns::Raw(raw.to_string())
    }
}

impl From<Col> for Columns {
    fn from(col: Col) -> Self {
        Columns::List(vec![col.into()])
    }
}

impl From<Vec<ColumnRef>> for Columns {
    fn from(cols: Vec<ColumnRef>) -> Self {
        Columns::List(cols)
    }
}

impl From<&[Col]> for Columns {
    fn from(cols: &[Col]) -> Self {
        Columns::List(cols.iter().copied().map(Into::into).collect())
    }
}

/// Comparison operators admitted in WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Is,
    IsNot,
    Like,
    ILike,
}

impl CmpOp {
    /// Parse an operator token, case-insensitively for word operators.
    pub fn parse(token: &str) -> Result<Self> {
        let op = match token.trim().to_ascii_uppercase().as_str() {
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "=" => Self::Eq,
            "!=" | "<>" => Self::Ne,
            "IS" => Self::Is,
            "IS NOT" => Self::IsNot,
            "LIKE" => Self::Like,
            "ILIKE" => Self::ILike,
            _ => {
                return Err(DbError::bad_argument(format!(
                    "unknown comparison operator: {token:?}"
                )));
            }
        };
        Ok(op)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

/// One WHERE clause. Clauses AND together.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `col = ?`, or `col IS NULL` when the value is null.
    Eq(ColumnRef, Value),
    /// `col <op> ?`; `IS` / `IS NOT` with a null operand emit `IS [NOT] NULL`.
    Cmp(ColumnRef, CmpOp, Value),
    /// `col IN (?, …)`; an empty list emits `col IN (NULL)`.
    In(ColumnRef, Vec<Value>),
    /// `col NOT IN (?, …)`; an empty list emits `col NOT IN (NULL)`.
    NotIn(ColumnRef, Vec<Value>),
    /// Raw predicate with `?` placeholders, emitted verbatim in parens.
    Expr(String, Vec<Value>),
}

/// An AND-joined set of WHERE clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub(crate) clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Equality clause; a null value emits `IS NULL`.
    pub fn eq(mut self, col: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(col.into(), value.into()));
        self
    }

    /// Comparison clause with a textual operator token.
    pub fn cmp(
        mut self,
        col: impl Into<ColumnRef>,
        op: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let op = CmpOp::parse(op)?;
        self.clauses.push(Clause::Cmp(col.into(), op, value.into()));
        Ok(self)
    }

    pub fn is_in<V: Into<Value>>(
        mut self,
        col: impl Into<ColumnRef>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clauses.push(Clause::In(
            col.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn not_in<V: Into<Value>>(
        mut self,
        col: impl Into<ColumnRef>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clauses.push(Clause::NotIn(
            col.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_null(mut self, col: impl Into<ColumnRef>) -> Self {
        self.clauses
            .push(Clause::Cmp(col.into(), CmpOp::Is, Value::Null));
        self
    }

    pub fn is_not_null(mut self, col: impl Into<ColumnRef>) -> Self {
        self.clauses
            .push(Clause::Cmp(col.into(), CmpOp::IsNot, Value::Null));
        self
    }

    /// Raw predicate fragment with `?` placeholders.
    pub fn expr<V: Into<Value>>(
        mut self,
        sql: impl Into<String>,
        params: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clauses.push(Clause::Expr(
            sql.into(),
            params.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }
}

impl From<Clause> for Filter {
    fn from(clause: Clause) -> Self {
        Filter {
            clauses: vec![clause],
        }
    }
}

impl<C, V> From<(C, V)> for Filter
where
    C: Into<ColumnRef>,
    V: Into<Value>,
{
    fn from((col, value): (C, V)) -> Self {
        Filter::new().eq(col, value)
    }
}

impl From<()> for Filter {
    fn from(_: ()) -> Self {
        Filter::new()
    }
}

/// Sort direction; the boolean form maps `true` to ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(DbError::bad_argument(format!(
                "unknown sort direction: {token:?}"
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl From<bool> for Direction {
    fn from(ascending: bool) -> Self {
        if ascending { Self::Asc } else { Self::Desc }
    }
}

/// ORDER BY terms in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Order {
    pub(crate) terms: Vec<(ColumnRef, Direction)>,
}

impl Order {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn by(mut self, col: impl Into<ColumnRef>) -> Self {
        self.terms.push((col.into(), Direction::Asc));
        self
    }

    pub fn by_desc(mut self, col: impl Into<ColumnRef>) -> Self {
        self.terms.push((col.into(), Direction::Desc));
        self
    }

    pub fn by_dir(mut self, col: impl Into<ColumnRef>, dir: impl Into<Direction>) -> Self {
        self.terms.push((col.into(), dir.into()));
        self
    }

    /// Add a term with a textual direction token; unknown tokens are
    /// rejected before any I/O.
    pub fn by_token(mut self, col: impl Into<ColumnRef>, dir: &str) -> Result<Self> {
        let direction = Direction::parse(dir)?;
        self.terms.push((col.into(), direction));
        Ok(self)
    }

    /// Parse a textual term: a bare name sorts ascending; a trailing
    /// `ASC`/`DESC` token sets the direction.
    fn parse_term(term: &str) -> (ColumnRef, Direction) {
        let trimmed = term.trim();
        if let Some((name, dir)) = trimmed.rsplit_once(char::is_whitespace) {
            if let Ok(direction) = Direction::parse(dir) {
                return (ColumnRef::raw(name.trim_end()), direction);
            }
        }
        (ColumnRef::raw(trimmed), Direction::Asc)
    }
}

impl From<&str> for Order {
    fn from(term: &str) -> Self {
        Order {
            terms: vec![Order::parse_term(term)],
        }
    }
}

impl From<Col> for Order {
    fn from(col: Col) -> Self {
        Order {
            terms: vec![(col.into(), Direction::Asc)],
        }
    }
}

impl<C: Into<ColumnRef>> From<(C, bool)> for Order {
    fn from((col, ascending): (C, bool)) -> Self {
        Order {
            terms: vec![(col.into(), ascending.into())],
        }
    }
}

impl<C: Into<ColumnRef>> From<(C, Direction)> for Order {
    fn from((col, dir): (C, Direction)) -> Self {
        Order {
            terms: vec![(col.into(), dir)],
        }
    }
}

impl From<Vec<(ColumnRef, Direction)>> for Order {
    fn from(terms: Vec<(ColumnRef, Direction)>) -> Self {
        Order { terms }
    }
}

/// GROUP BY column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    pub(crate) columns: Vec<ColumnRef>,
}

impl Group {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl From<&str> for Group {
    fn from(name: &str) -> Self {
        Group {
            columns: vec![ColumnRef::raw(name)],
        }
    }
}

impl From<Col> for Group {
    fn from(col: Col) -> Self {
        Group {
            columns: vec![col.into()],
        }
    }
}

impl From<Vec<ColumnRef>> for Group {
    fn from(columns: Vec<ColumnRef>) -> Self {
        Group { columns }
    }
}

/// LIMIT/OFFSET pair. A negative or absent member omits that clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limit {
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
}

impl Limit {
    pub fn new(limit: impl Into<Option<i64>>, offset: impl Into<Option<i64>>) -> Self {
        Self {
            limit: limit.into().filter(|n| *n >= 0),
            offset: offset.into().filter(|n| *n >= 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }
}

impl From<i64> for Limit {
    fn from(limit: i64) -> Self {
        Limit::new(limit, None)
    }
}

impl From<usize> for Limit {
    fn from(limit: usize) -> Self {
        Limit::new(limit as i64, None)
    }
}

impl From<(i64, i64)> for Limit {
    fn from((limit, offset): (i64, i64)) -> Self {
        Limit::new(limit, offset)
    }
}

/// Ordered column-value pairs for INSERT and UPDATE.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Values {
    pub(crate) pairs: Vec<(ColumnRef, Value)>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn set(mut self, col: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        self.pairs.push((col.into(), value.into()));
        self
    }

    /// Set a column from a host type through the adapter registry.
    pub fn set_adapted<T: std::any::Any>(
        mut self,
        col: impl Into<ColumnRef>,
        value: &T,
    ) -> Result<Self> {
        self.pairs.push((col.into(), crate::registry::adapt(value)?));
        Ok(self)
    }

    /// Extract the pairs of a record instance.
    pub fn from_record<R: Record>(record: &R) -> Self {
        Values {
            pairs: record
                .values()
                .into_iter()
                .map(|(col, value)| (col.into(), value))
                .collect(),
        }
    }
}

impl<C, V> From<(C, V)> for Values
where
    C: Into<ColumnRef>,
    V: Into<Value>,
{
    fn from((col, value): (C, V)) -> Self {
        Values::new().set(col, value)
    }
}

impl<C, V> FromIterator<(C, V)> for Values
where
    C: Into<ColumnRef>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        Values {
            pairs: iter
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        }
    }
}

/// Parameters for raw `execute`: positional, or a named mapping where the
/// engine's driver supports one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<&[Value]> for Params {
    fn from(values: &[Value]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Params {
    fn from(values: [V; N]) -> Self {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(named: Vec<(String, Value)>) -> Self {
        Params::Named(named)
    }
}

/// The combined SELECT argument bundle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub(crate) columns: Columns,
    pub(crate) filter: Filter,
    pub(crate) group: Group,
    pub(crate) order: Order,
    pub(crate) limit: Limit,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: impl Into<Columns>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        let mut filter = filter.into();
        self.filter.clauses.append(&mut filter.clauses);
        self
    }

    /// Equality shorthand, the moral equivalent of a keyword argument.
    pub fn eq(mut self, col: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        self.filter = self.filter.eq(col, value);
        self
    }

    pub fn group_by(mut self, group: impl Into<Group>) -> Self {
        self.group = group.into();
        self
    }

    pub fn order_by(mut self, order: impl Into<Order>) -> Self {
        let mut order = order.into();
        self.order.terms.append(&mut order.terms);
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        let limit = limit.into();
        self.limit.limit = limit.limit;
        if limit.offset.is_some() {
            self.limit.offset = limit.offset;
        }
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.limit.offset = Some(offset).filter(|n| *n >= 0);
        self
    }
}

impl From<()> for Query {
    fn from(_: ()) -> Self {
        Query::new()
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query::new().filter(filter)
    }
}

impl<C, V> From<(C, V)> for Query
where
    C: Into<ColumnRef>,
    V: Into<Value>,
{
    fn from(pair: (C, V)) -> Self {
        Query::new().filter(Filter::from(pair))
    }
}
