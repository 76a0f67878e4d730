use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid urn '{urn}': {reason}")]
    InvalidUrn { urn: String, reason: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("missing key field '{field}' for type {type_name}")]
    MissingKeyField { type_name: String, field: String },
}
