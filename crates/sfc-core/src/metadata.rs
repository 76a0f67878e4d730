//! Registration-time metadata: which properties a type has, in which storage
//! slot each lives, which of them form the identity key, and which child
//! collections hang off the type.

use serde::{Deserialize, Serialize};
use sfc_types::ValueType;

bitflags::bitflags! {
    /// Behavioral flags of a property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u32 {
        /// Must hold a value before the object is created.
        const REQUIRED = 0x10;
        /// Fetched individually on first access rather than with the object.
        const EXPENSIVE = 0x20;
        /// Derived by the backing store; never written by clients.
        const COMPUTED = 0x40;
        const ENCRYPTED = 0x80;
        /// Writable only while the object is `Pending`.
        const READ_ONLY_AFTER_CREATION = 0x100;
        const DATA = 0x200;
        const STANDALONE = 0x400;
        const SQL_AZURE_DATABASE = 0x800;
        const DESIGN = 0x1000;
        const DEPLOY = 0x2000;
    }
}

/// One property of a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyMetadata {
    pub name: String,
    pub value_type: ValueType,
    pub flags: PropertyFlags,
    /// Position within the identity key, `None` for non-key properties.
    pub key_ordinal: Option<usize>,
}

impl PropertyMetadata {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            flags: PropertyFlags::empty(),
            key_ordinal: None,
        }
    }

    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark as key property at `ordinal`.
    pub fn key(mut self, ordinal: usize) -> Self {
        self.key_ordinal = Some(ordinal);
        self
    }

    pub fn is_key(&self) -> bool {
        self.key_ordinal.is_some()
    }

    pub fn is_writable(&self) -> bool {
        !self.flags.contains(PropertyFlags::COMPUTED)
    }
}

/// Storage strategy of a child collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackingKind {
    /// Ordered by the collection's collation over key text.
    #[default]
    Sorted,
    /// Hashed, unordered.
    Dictionary,
    /// Insertion order, linear lookup.
    List,
}

/// A child collection declared by a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildCollectionDef {
    pub element_type: String,
    pub backing: BackingKind,
}

/// Metadata of one object type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeMetadata {
    type_name: String,
    properties: Vec<PropertyMetadata>,
    child_collections: Vec<ChildCollectionDef>,
}

impl TypeMetadata {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
            child_collections: Vec::new(),
        }
    }

    pub fn property(mut self, property: PropertyMetadata) -> Self {
        self.properties.push(property);
        self
    }

    pub fn child(mut self, element_type: impl Into<String>, backing: BackingKind) -> Self {
        self.child_collections.push(ChildCollectionDef {
            element_type: element_type.into(),
            backing,
        });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &[PropertyMetadata] {
        &self.properties
    }

    /// Number of storage slots an instance of this type needs.
    pub fn slot_count(&self) -> usize {
        self.properties.len()
    }

    /// Storage slot of `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Key properties in key order.
    pub fn key_properties(&self) -> Vec<&PropertyMetadata> {
        let mut keys: Vec<&PropertyMetadata> =
            self.properties.iter().filter(|p| p.is_key()).collect();
        keys.sort_by_key(|p| p.key_ordinal);
        keys
    }

    pub fn key_field_names(&self) -> Vec<&str> {
        self.key_properties()
            .into_iter()
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Properties fetched together when an object is initialized.
    pub fn eager_property_names(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|p| !p.flags.contains(PropertyFlags::EXPENSIVE))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn child_collections(&self) -> &[ChildCollectionDef] {
        &self.child_collections
    }
}
