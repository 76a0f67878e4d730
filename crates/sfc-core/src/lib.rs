//! Object lifecycle and collection synchronization for SFC.
//!
//! A [`Domain`] opens a registered [`DomainDefinition`] over an optional
//! backing-store connection and exposes its root [`Instance`]. Every instance
//! owns:
//!
//! - a [`KeyChain`] -- its identity keys from the domain root down, shared
//!   with its descendants
//! - a lifecycle [`ObjectState`](sfc_types::ObjectState)
//! - a [`PropertyCollection`] filled lazily or from query rows
//! - one [`ChildCollection`] per declared child type, loaded on first use and
//!   reconciled with the store through a shadow merge
//!
//! CRUD methods on [`Instance`] script the change, route it through the
//! domain's connection context, advance states, and raise [`ObjectEvent`]s.

pub mod collation;
pub mod collection;
pub mod config;
pub mod crud;
pub mod domain;
pub mod error;
pub mod events;
pub mod factory;
pub mod instance;
pub mod key_chain;
pub mod metadata;
pub mod object_type;
pub mod properties;
pub mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use collation::{Collation, CollationConfig, Comparer, Locale};
pub use collection::{
    Backing, ChildCollection, Collection, DictionaryBacking, ListBacking, SortedBacking,
};
pub use config::DomainConfig;
pub use crud::{CrudAction, CrudKind};
pub use domain::{Domain, DomainDefinition};
pub use error::{SfcError, SfcResult};
pub use events::{EventBus, EventFilter, EventKind, EventStream, ObjectEvent, ObjectObserver};
pub use factory::ObjectFactory;
pub use instance::Instance;
pub use key_chain::KeyChain;
pub use metadata::{BackingKind, ChildCollectionDef, PropertyFlags, PropertyMetadata, TypeMetadata};
pub use object_type::{MetadataType, ObjectType};
pub use properties::{Populator, PropertyCollection, PropertySlot, PropertyValues, RowPopulator};
pub use registry::DomainRegistry;
