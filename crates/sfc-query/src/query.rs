//! Query construction and the cached/streaming split.

use std::sync::Arc;

use sfc_core::{Domain, SfcError};
use sfc_store::{ActiveQueriesMode, ConnectionMode, Request, ResultTable, URN_COLUMN};
use sfc_types::QueryExpression;
use tracing::debug;

use crate::error::QueryResult;
use crate::iterator::ObjectIterator;

/// A query expression bound to an open domain.
#[derive(Clone, Debug)]
pub struct ObjectQuery {
    domain: Arc<Domain>,
    query: QueryExpression,
    fields: Vec<String>,
    order_by: Vec<String>,
    mode: ActiveQueriesMode,
}

impl ObjectQuery {
    /// A query using the domain's configured active-queries mode.
    pub fn new(domain: Arc<Domain>, query: QueryExpression) -> Self {
        let mode = domain.config().active_queries;
        Self {
            domain,
            query,
            fields: Vec::new(),
            order_by: Vec::new(),
            mode,
        }
    }

    /// Request these properties. Without any, the target type's eager
    /// properties are requested.
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

    pub fn with_mode(mut self, mode: ActiveQueriesMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn expression(&self) -> &QueryExpression {
        &self.query
    }

    pub fn mode(&self) -> ActiveQueriesMode {
        self.mode
    }

    /// The store request this query issues.
    pub fn request(&self) -> QueryResult<Request> {
        let fields = if self.fields.is_empty() {
            let type_name = self
                .query
                .urn()
                .type_name()
                .ok_or_else(|| SfcError::DomainNotFound(self.query.to_string()))?;
            self.domain
                .object_type(type_name)?
                .metadata()
                .eager_property_names()
        } else {
            self.fields.clone()
        };
        Ok(Request::new(self.query.clone())
            .with_fields(fields)
            .with_order_by(self.order_by.iter().cloned()))
    }

    /// Run the query on the primary connection and materialize every row.
    ///
    /// Offline, the table is empty but carries the requested columns.
    pub fn execute_table(&self) -> QueryResult<ResultTable> {
        load_table(&self.domain, &self.request()?)
    }

    /// Open an iterator over the matching objects.
    pub fn execute_iterator(&self) -> QueryResult<ObjectIterator> {
        ObjectIterator::open(self.domain.clone(), self.request()?, self.mode)
    }
}

/// Materialize `request` through the domain's primary connection.
pub(crate) fn load_table(domain: &Domain, request: &Request) -> QueryResult<ResultTable> {
    let connection = match domain.mode() {
        ConnectionMode::Offline => None,
        _ => domain.connection_context().connection().cloned(),
    };
    let Some(connection) = connection else {
        let mut columns = vec![URN_COLUMN.to_string()];
        columns.extend(request.fields.iter().cloned());
        return Ok(ResultTable::new(columns));
    };
    let mut reader = connection.enumerator().get_data(request)?;
    let table = ResultTable::load(reader.as_mut())?;
    debug!(query = %request.query, rows = table.len(), "query table loaded");
    Ok(table)
}
