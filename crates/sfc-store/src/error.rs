use sfc_types::TypeError;

use crate::context::ConnectionMode;

/// Errors from backing-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested connection-mode transition is not in the transition table.
    #[error("invalid connection mode transition from {from} to {to}")]
    InvalidModeTransition {
        from: ConnectionMode,
        to: ConnectionMode,
    },

    /// An operation needed a connection handle and the context has none.
    #[error("no connection available")]
    NoConnection,

    /// The connection is closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(uuid::Uuid),

    /// The connection cannot be cloned.
    #[error("connection clone refused: {0}")]
    CloneRefused(String),

    /// A second reader was requested on a connection that allows one.
    #[error("connection {0} already has an active reader")]
    ReaderBusy(uuid::Uuid),

    /// The reader was used after it was closed.
    #[error("reader is closed")]
    ReaderClosed,

    /// Value access before `read()` or past the last row.
    #[error("reader has no current row")]
    NoCurrentRow,

    #[error("column ordinal {0} out of range")]
    ColumnOutOfRange(usize),

    /// The backing store rejected a query.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The backing store rejected a script.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A transacted batch was handed to an engine without transactions.
    #[error("execution engine does not support transacted batches")]
    TransactionsUnsupported,

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
