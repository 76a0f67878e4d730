//! Query requests, streaming readers, and materialized result tables.

use serde::{Deserialize, Serialize};
use sfc_types::{QueryExpression, Value};

use crate::error::{StoreError, StoreResult};

/// Name of the column carrying each row's URN text.
pub const URN_COLUMN: &str = "Urn";

/// A query against the backing store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub query: QueryExpression,
    /// Requested property columns. Empty means every stored property.
    pub fields: Vec<String>,
    /// Property names to sort by, ascending. Empty means URN order.
    pub order_by: Vec<String>,
}

impl Request {
    pub fn new(query: QueryExpression) -> Self {
        Self {
            query,
            fields: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_order_by<I, S>(mut self, order_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = order_by.into_iter().map(Into::into).collect();
        self
    }
}

/// Issues requests against a backing store.
pub trait Enumerator: Send + Sync {
    /// Run `request`, returning a reader positioned before the first row.
    fn get_data(&self, request: &Request) -> StoreResult<Box<dyn DataReader>>;
}

/// A forward-only cursor over query results.
pub trait DataReader: Send {
    fn columns(&self) -> &[String];

    /// Advance to the next row. Returns `false` once the rows are exhausted.
    fn read(&mut self) -> StoreResult<bool>;

    /// Value of column `ordinal` in the current row.
    fn value(&self, ordinal: usize) -> StoreResult<&Value>;

    /// Release the reader. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// Case-insensitive column lookup.
    fn column_index(&self, name: &str) -> Option<usize> {
        column_index(self.columns(), name)
    }

    /// Value of the named column in the current row, `None` if no such column.
    fn value_by_name(&self, name: &str) -> StoreResult<Option<&Value>> {
        match self.column_index(name) {
            Some(i) => self.value(i).map(Some),
            None => Ok(None),
        }
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.eq_ignore_ascii_case(name))
}

/// A fully materialized query result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Drain `reader` into a table. The reader is closed afterwards.
    pub fn load(reader: &mut dyn DataReader) -> StoreResult<Self> {
        let mut table = ResultTable::new(reader.columns().to_vec());
        let loaded = table.drain_rows(reader);
        reader.close();
        loaded.map(|()| table)
    }

    fn drain_rows(&mut self, reader: &mut dyn DataReader) -> StoreResult<()> {
        let width = self.columns.len();
        while reader.read()? {
            let row = (0..width)
                .map(|i| reader.value(i).cloned())
                .collect::<StoreResult<Vec<_>>>()?;
            self.rows.push(row);
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        column_index(&self.columns, name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn into_reader(self) -> TableReader {
        TableReader::new(self)
    }
}

/// A [`DataReader`] over an in-memory [`ResultTable`].
#[derive(Debug)]
pub struct TableReader {
    table: ResultTable,
    position: Option<usize>,
    closed: bool,
}

impl TableReader {
    pub fn new(table: ResultTable) -> Self {
        Self {
            table,
            position: None,
            closed: false,
        }
    }
}

impl DataReader for TableReader {
    fn columns(&self) -> &[String] {
        &self.table.columns
    }

    fn read(&mut self) -> StoreResult<bool> {
        if self.closed {
            return Err(StoreError::ReaderClosed);
        }
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.table.rows.len()));
        Ok(next < self.table.rows.len())
    }

    fn value(&self, ordinal: usize) -> StoreResult<&Value> {
        if self.closed {
            return Err(StoreError::ReaderClosed);
        }
        let row = self
            .position
            .and_then(|p| self.table.rows.get(p))
            .ok_or(StoreError::NoCurrentRow)?;
        row.get(ordinal)
            .ok_or(StoreError::ColumnOutOfRange(ordinal))
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        let mut t = ResultTable::new(vec!["Urn".into(), "Name".into()]);
        t.push_row(vec!["A[@Name='a']".into(), "a".into()]);
        t.push_row(vec!["A[@Name='b']".into()]);
        t
    }

    #[test]
    fn short_rows_are_padded() {
        let t = sample();
        assert_eq!(t.value(1, "Name"), Some(&Value::Null));
        assert_eq!(t.value(0, "NAME"), Some(&Value::from("a")));
        assert_eq!(t.value(0, "Missing"), None);
    }

    #[test]
    fn table_reader_walks_rows() {
        let mut r = sample().into_reader();
        assert!(matches!(r.value(0), Err(StoreError::NoCurrentRow)));
        assert!(r.read().unwrap());
        assert_eq!(r.value_by_name("name").unwrap(), Some(&Value::from("a")));
        assert!(r.read().unwrap());
        assert!(!r.read().unwrap());
        assert!(!r.read().unwrap());
        assert!(matches!(r.value(0), Err(StoreError::NoCurrentRow)));
    }

    #[test]
    fn closed_reader_rejects_access() {
        let mut r = sample().into_reader();
        r.close();
        r.close();
        assert!(r.is_closed());
        assert!(matches!(r.read(), Err(StoreError::ReaderClosed)));
    }

    #[test]
    fn load_drains_and_closes() {
        let mut r = sample().into_reader();
        let loaded = ResultTable::load(&mut r).unwrap();
        assert!(r.is_closed());
        assert_eq!(loaded, sample());
    }
}
