use sfc_core::SfcError;
use sfc_store::StoreError;

/// Errors produced while running an object query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Sfc(#[from] SfcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Result rows carry no URN column to resolve objects from.
    #[error("query result has no URN column")]
    MissingUrnColumn,

    /// A URN cell held something other than text.
    #[error("row {row} has a non-text URN value")]
    InvalidUrnValue { row: usize },

    /// The iterator was used after `close`.
    #[error("iterator is closed")]
    Closed,
}

/// Result alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
