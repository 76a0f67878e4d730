use sfc_store::StoreError;
use sfc_types::{ObjectState, TypeError};

use crate::crud::CrudKind;

/// Errors from the object lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum SfcError {
    /// Rename of a non-member, rename onto an occupied key, or a new key
    /// with no usable key properties.
    #[error("invalid rename: {0}")]
    InvalidRename(String),

    /// The backing store has no counterpart for a lazily created object.
    #[error("object {urn} does not exist in the backing store")]
    ObjectInitialization { urn: String },

    #[error("type {type_name} is not registered in domain {domain}")]
    TypeNotFound { domain: String, type_name: String },

    #[error("domain not found: {0}")]
    DomainNotFound(String),

    #[error("domain already registered: {0}")]
    DomainAlreadyRegistered(String),

    /// The domain owning an object has been dropped.
    #[error("domain of {0} has been released")]
    DomainReleased(String),

    #[error("object {urn} is {state}, operation requires {expected}")]
    InvalidState {
        urn: String,
        state: ObjectState,
        expected: ObjectState,
    },

    #[error("object {0} has no parent")]
    MissingParent(String),

    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey { collection: String, key: String },

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("type {type_name} cannot script {action}")]
    NotScriptable { type_name: String, action: CrudKind },

    #[error("{operation} failed for {urn}: {reason}")]
    CrudFailed {
        operation: CrudKind,
        urn: String,
        reason: String,
    },

    /// An object was added to a collection not owned by its parent.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// A shadow item was staged without a prepared merge.
    #[error("no merge in progress for collection {0}")]
    MergeNotPrepared(String),

    #[error("invalid key chain: {0}")]
    InvalidKeyChain(String),

    #[error("type {type_name} has no property {property}")]
    UnknownProperty { type_name: String, property: String },

    #[error("property {property} of {type_name} is read-only")]
    ReadOnlyProperty { type_name: String, property: String },

    #[error("object {urn} is missing required properties: {}", properties.join(", "))]
    MissingRequiredProperties { urn: String, properties: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for lifecycle operations.
pub type SfcResult<T> = Result<T, SfcError>;
