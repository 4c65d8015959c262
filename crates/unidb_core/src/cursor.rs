use crate::error::Result;
use crate::registry::{self, RowFactory};
use crate::row::Row;
use crate::value::Value;

/// Result-set column: name plus the declared type tag driving converters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub decl_type: Option<String>,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, decl_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            decl_type,
        }
    }
}

/// Driver cursor contract.
///
/// Engines supply raw cells; the conversion pipeline and row factory live in
/// [`Rows`], on top of this trait.
pub trait Cursor {
    /// Column descriptions of the result set.
    fn description(&self) -> &[ColumnDesc];

    /// Fetch the next raw row, or `None` when exhausted.
    fn fetchone(&mut self) -> Result<Option<Vec<Value>>>;

    fn fetchmany(&mut self, n: usize) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while rows.len() < n {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rows affected by a non-query statement, when the driver reports it.
    fn rowcount(&self) -> Option<u64> {
        None
    }
}

/// A cursor over pre-fetched rows. Used by the embedded engine, whose driver
/// cursors cannot outlive their statement, and by the networked autocommit
/// path, whose driver materializes result sets.
pub struct BufferedCursor {
    description: Vec<ColumnDesc>,
    rows: std::collections::VecDeque<Vec<Value>>,
    rowcount: Option<u64>,
}

impl BufferedCursor {
    pub fn new(description: Vec<ColumnDesc>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            description,
            rows: rows.into(),
            rowcount: None,
        }
    }

    pub fn with_rowcount(mut self, rowcount: u64) -> Self {
        self.rowcount = Some(rowcount);
        self
    }
}

impl Cursor for BufferedCursor {
    fn description(&self) -> &[ColumnDesc] {
        &self.description
    }

    fn fetchone(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }

    fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }
}

/// Lazy row stream: converts each cell through the registered converter for
/// its declared type tag, then materializes through the row factory chain
/// (Database factory, else process factory, else ordered mapping).
pub struct Rows<'a> {
    cursor: Box<dyn Cursor + 'a>,
    factory: Option<RowFactory>,
    names: Vec<String>,
    tags: Vec<Option<String>>,
}

impl<'a> Rows<'a> {
    pub fn new(cursor: Box<dyn Cursor + 'a>, db_factory: Option<RowFactory>) -> Self {
        let description = cursor.description();
        let names: Vec<String> = description.iter().map(|c| c.name.clone()).collect();
        let tags: Vec<Option<String>> = description.iter().map(|c| c.decl_type.clone()).collect();

        Self {
            cursor,
            factory: db_factory.or_else(registry::row_factory),
            names,
            tags,
        }
    }

    pub fn description(&self) -> Vec<ColumnDesc> {
        self.names
            .iter()
            .zip(self.tags.iter())
            .map(|(name, tag)| ColumnDesc::new(name.clone(), tag.clone()))
            .collect()
    }

    /// Rows affected by a non-query statement, when the driver reports it.
    pub fn affected(&self) -> Option<u64> {
        self.cursor.rowcount()
    }

    fn materialize(&self, raw: Vec<Value>) -> Result<Row> {
        let mut pairs = Vec::with_capacity(raw.len());
        for (i, cell) in raw.into_iter().enumerate() {
            let tag = self.tags.get(i).and_then(|t| t.as_deref());
            let converted = registry::convert(tag, cell)?;
            let name = self
                .names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("column{}", i));
            pairs.push((name, converted));
        }

        Ok(match &self.factory {
            Some(factory) => factory(pairs),
            None => Row::from_pairs(pairs),
        })
    }

    /// Materialize the remaining rows.
    pub fn collect_all(mut self) -> Result<Vec<Row>> {
        let raw = self.cursor.fetchall()?;
        raw.into_iter().map(|r| self.materialize(r)).collect()
    }

    /// Materialize at most the next row.
    pub fn first(mut self) -> Result<Option<Row>> {
        match self.cursor.fetchone()? {
            Some(raw) => Ok(Some(self.materialize(raw)?)),
            None => Ok(None),
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.fetchone() {
            Ok(Some(raw)) => Some(self.materialize(raw)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> BufferedCursor {
        BufferedCursor::new(
            vec![
                ColumnDesc::new("id", Some("INTEGER".into())),
                ColumnDesc::new("val", Some("TEXT".into())),
            ],
            vec![
                vec![Value::Int(1), Value::Null],
                vec![Value::Int(2), Value::Text("a".into())],
            ],
        )
    }

    #[test]
    fn rows_iterate_as_ordered_mappings() {
        let rows: Vec<Row> = Rows::new(Box::new(cursor()), None)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("val"), Some(&Value::Null));
        let names: Vec<&str> = rows[1].columns().collect();
        assert_eq!(names, vec!["id", "val"]);
    }

    #[test]
    fn fetchmany_respects_batch_size() {
        let mut c = cursor();
        assert_eq!(c.fetchmany(1).unwrap().len(), 1);
        assert_eq!(c.fetchmany(5).unwrap().len(), 1);
        assert!(c.fetchmany(1).unwrap().is_empty());
    }

    #[test]
    fn database_factory_wins_over_mapping() {
        let factory: RowFactory = std::sync::Arc::new(|pairs| {
            let mut row = Row::new();
            for (name, value) in pairs {
                row.set(name.to_ascii_uppercase(), value);
            }
            row
        });

        let rows: Vec<Row> = Rows::new(Box::new(cursor()), Some(factory))
            .collect::<Result<_>>()
            .unwrap();
        assert!(rows[0].get("ID").is_some());
    }
}
