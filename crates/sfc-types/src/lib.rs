//! Foundation types for SFC (SQL Server Foundation Classes).
//!
//! This crate provides the value, addressing, and identity types shared by
//! every other SFC crate. It has no knowledge of connections, collections, or
//! object lifecycles; those live in `sfc-store` and `sfc-core`.
//!
//! # Key Types
//!
//! - [`Value`] -- A single property value as read from or written to a backing store
//! - [`Urn`] -- Hierarchical, attribute-qualified address of an object
//! - [`QueryExpression`] -- A URN whose attributes act as equality filters
//! - [`Key`] -- The identity key distinguishing an object among its siblings
//! - [`ObjectState`] -- Lifecycle state of an in-memory object

pub mod error;
pub mod key;
pub mod state;
pub mod urn;
pub mod value;

pub use error::TypeError;
pub use key::{Key, KeyKind};
pub use state::ObjectState;
pub use urn::{QueryExpression, Urn, UrnSegment};
pub use value::{Value, ValueType};
