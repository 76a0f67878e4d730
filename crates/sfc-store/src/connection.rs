use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::reader::Enumerator;
use crate::script::ExecutionEngine;

/// Identity of a connection handle. Clones get a fresh id.
pub type ConnectionId = uuid::Uuid;

/// A session with a backing store.
///
/// Implementations must be shareable across threads; the engine hands the same
/// handle to collections, iterators, and the connection context.
pub trait Connection: Send + Sync + fmt::Debug {
    fn id(&self) -> ConnectionId;

    /// Open the session. Opening an open connection is a no-op.
    fn connect(&self) -> StoreResult<()>;

    /// Close the session. Closing a closed connection is a no-op.
    fn disconnect(&self) -> StoreResult<()>;

    fn is_open(&self) -> bool;

    /// Create an independent, open session against the same store.
    ///
    /// The caller owns the clone and must disconnect it.
    fn copy(&self) -> StoreResult<Arc<dyn Connection>>;

    /// Whether more than one reader may be open on this session at a time.
    fn supports_multiple_active_readers(&self) -> bool {
        false
    }

    /// Query hand-off.
    fn enumerator(&self) -> &dyn Enumerator;

    /// Script execution hand-off.
    fn engine(&self) -> &dyn ExecutionEngine;
}

/// Policy for overlapping reads on one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveQueriesMode {
    /// Materialize the whole result up front; the reader is closed immediately.
    #[default]
    CachedQuery,
    /// Stream, holding the only reader on the connection.
    SingleActiveQuery,
    /// Stream on a connection that multiplexes readers.
    MultipleActiveQueries,
}

impl fmt::Display for ActiveQueriesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActiveQueriesMode::CachedQuery => "CachedQuery",
            ActiveQueriesMode::SingleActiveQuery => "SingleActiveQuery",
            ActiveQueriesMode::MultipleActiveQueries => "MultipleActiveQueries",
        };
        f.write_str(s)
    }
}
