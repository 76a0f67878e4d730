//! Streaming object iterator.
//!
//! On open the iterator asks the domain for a connection tuned to the
//! requested [`ActiveQueriesMode`]:
//!
//! - `None`, or an error, means the rows are read into a private table on the
//!   primary connection and its reader is closed at once
//! - a connection other than the primary is a clone owned by the iterator and
//!   is disconnected when the iterator closes
//! - the primary connection itself is never disconnected here
//!
//! [`ObjectIterator::current`] resolves the row to an instance once per
//! position.

use std::fmt;
use std::sync::Arc;

use sfc_core::{Domain, Instance, RowPopulator, SfcError};
use sfc_store::{ActiveQueriesMode, Connection, DataReader, Request, StoreResult, URN_COLUMN};
use sfc_types::{ObjectState, Urn, Value};
use tracing::{debug, warn};

use crate::error::{QueryError, QueryResult};
use crate::query::load_table;

/// Iterates the objects matched by an [`ObjectQuery`](crate::ObjectQuery).
pub struct ObjectIterator {
    domain: Arc<Domain>,
    request: Request,
    mode: ActiveQueriesMode,
    connection: Option<Arc<dyn Connection>>,
    close_connection: bool,
    reader: Option<Box<dyn DataReader>>,
    columns: Vec<String>,
    urn_ordinal: usize,
    row: Option<Vec<Value>>,
    position: usize,
    current: Option<Arc<Instance>>,
    closed: bool,
}

impl ObjectIterator {
    pub(crate) fn open(
        domain: Arc<Domain>,
        request: Request,
        mode: ActiveQueriesMode,
    ) -> QueryResult<Self> {
        let mut iter = Self {
            domain,
            request,
            mode,
            connection: None,
            close_connection: false,
            reader: None,
            columns: Vec::new(),
            urn_ordinal: 0,
            row: None,
            position: 0,
            current: None,
            closed: false,
        };
        iter.start()?;
        Ok(iter)
    }

    fn start(&mut self) -> QueryResult<()> {
        let selected = match self.domain.query_connection(self.mode) {
            Ok(selected) => selected,
            Err(e) => {
                warn!(mode = %self.mode, error = %e, "no query connection, caching results");
                None
            }
        };

        let reader = match selected {
            Some(conn) => {
                let primary = self.domain.connection_context().connection().map(|c| c.id());
                self.close_connection = primary != Some(conn.id());
                debug!(connection = %conn.id(), clone = self.close_connection, "streaming query");
                let reader = conn.enumerator().get_data(&self.request);
                self.connection = Some(conn);
                match reader {
                    Ok(reader) => reader,
                    Err(e) => {
                        self.release();
                        return Err(e.into());
                    }
                }
            }
            None => {
                let table = load_table(&self.domain, &self.request)?;
                debug!(mode = %self.mode, rows = table.len(), "query results cached");
                Box::new(table.into_reader())
            }
        };

        self.columns = reader.columns().to_vec();
        self.reader = Some(reader);
        match self.columns.iter().position(|c| c.eq_ignore_ascii_case(URN_COLUMN)) {
            Some(ordinal) => {
                self.urn_ordinal = ordinal;
                Ok(())
            }
            None => {
                self.release();
                Err(QueryError::MissingUrnColumn)
            }
        }
    }

    /// Advance to the next row. Returns `false` once the rows are exhausted;
    /// the reader and any owned connection are released at that point.
    pub fn move_next(&mut self) -> QueryResult<bool> {
        if self.closed {
            return Err(QueryError::Closed);
        }
        self.current = None;
        self.row = None;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        let next = reader.read().and_then(|more| {
            if !more {
                return Ok(None);
            }
            (0..reader.columns().len())
                .map(|i| reader.value(i).cloned())
                .collect::<StoreResult<Vec<_>>>()
                .map(Some)
        });
        match next {
            Ok(Some(values)) => {
                self.row = Some(values);
                self.position += 1;
                Ok(true)
            }
            Ok(None) => {
                self.release();
                Ok(false)
            }
            Err(e) => {
                self.release();
                Err(e.into())
            }
        }
    }

    /// The object at the current position, `None` before the first row or
    /// after the last. Repeated calls return the same instance.
    pub fn current(&mut self) -> QueryResult<Option<Arc<Instance>>> {
        if let Some(ref current) = self.current {
            return Ok(Some(current.clone()));
        }
        let instance = {
            let Some(row) = self.row.as_ref() else {
                return Ok(None);
            };
            self.resolve(row)?
        };
        self.current = Some(instance.clone());
        Ok(Some(instance))
    }

    /// Release everything and issue the query again.
    pub fn reset(&mut self) -> QueryResult<()> {
        self.release();
        self.row = None;
        self.current = None;
        self.position = 0;
        self.closed = false;
        self.start()
    }

    /// Close the reader and any owned connection. Idempotent.
    pub fn close(&mut self) {
        self.release();
        self.row = None;
        self.current = None;
        self.closed = true;
    }

    /// Whether rows come straight from a live reader rather than a cache.
    pub fn is_streaming(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the iterator holds a cloned connection it must disconnect.
    pub fn owns_connection(&self) -> bool {
        self.close_connection
    }

    /// Rows consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    fn release(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        if let Some(conn) = self.connection.take() {
            if self.close_connection {
                if let Err(e) = conn.disconnect() {
                    warn!(connection = %conn.id(), error = %e, "failed to close query connection");
                }
            }
        }
        self.close_connection = false;
    }

    fn resolve(&self, row: &[Value]) -> QueryResult<Arc<Instance>> {
        let urn = match row.get(self.urn_ordinal) {
            Some(Value::Text(text)) => Urn::parse(text).map_err(SfcError::from)?,
            _ => {
                return Err(QueryError::InvalidUrnValue {
                    row: self.position,
                })
            }
        };

        let root = self.domain.root();
        let root_urn = root.urn();
        if urn == root_urn {
            return Ok(root.clone());
        }
        if urn.segments().first() != root_urn.segments().first() {
            return Err(SfcError::DomainNotFound(format!("{urn} is not under {root_urn}")).into());
        }

        let (Some(parent_urn), Some(leaf)) = (urn.parent(), urn.leaf()) else {
            return Err(SfcError::DomainNotFound(urn.to_string()).into());
        };
        let parent = self
            .domain
            .get_object(&parent_urn)?
            .ok_or_else(|| SfcError::ObjectInitialization {
                urn: parent_urn.to_string(),
            })?;
        let collection = parent.child_collection(leaf.type_name())?;
        let key = collection.object_type().key_from_segment(leaf)?;
        if let Some(existing) = collection.get_existing(&key) {
            return Ok(existing);
        }

        let populator = RowPopulator::new(&self.columns, row);
        let instance = collection
            .factory()
            .create_populated(&parent, &populator, ObjectState::Existing)?;
        collection.add(instance.clone())?;
        Ok(instance)
    }
}

impl Iterator for ObjectIterator {
    type Item = QueryResult<Arc<Instance>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.move_next() {
            Ok(true) => self.current().transpose(),
            Ok(false) | Err(QueryError::Closed) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for ObjectIterator {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ObjectIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectIterator")
            .field("query", &self.request.query.to_string())
            .field("mode", &self.mode)
            .field("streaming", &self.is_streaming())
            .field("owns_connection", &self.close_connection)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}
