//! Object instances: identity, lifecycle state, property storage, and child
//! collections of one domain object.
//!
//! Instances are always handled through `Arc<Instance>`. The parent link is
//! weak; ownership flows from the domain root down through collections.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, Weak};

use sfc_store::{ConnectionMode, Request, ResultTable};
use sfc_types::{Key, ObjectState, QueryExpression, Urn, UrnSegment, Value};
use tracing::{debug, trace};

use crate::collation::Collation;
use crate::collection::{new_collection, Backing, ChildCollection, Collection};
use crate::domain::{Domain, DomainDefinition};
use crate::error::{SfcError, SfcResult};
use crate::key_chain::KeyChain;
use crate::metadata::{BackingKind, PropertyFlags, TypeMetadata};
use crate::object_type::{value_from_key_text, ObjectType};
use crate::properties::{Populator, PropertyCollection, RowPopulator};

pub struct Instance {
    domain: Weak<Domain>,
    object_type: Arc<dyn ObjectType>,
    key_chain: Arc<KeyChain>,
    parent: RwLock<Weak<Instance>>,
    state: RwLock<ObjectState>,
    properties: RwLock<PropertyCollection>,
    children: Vec<Arc<dyn ChildCollection>>,
}

/// Fallible half of instance construction: the object type with its child
/// element types resolved against the domain.
pub(crate) struct InstanceParts {
    object_type: Arc<dyn ObjectType>,
    children: Vec<(BackingKind, Arc<dyn ObjectType>)>,
}

impl InstanceParts {
    pub(crate) fn prepare(
        definition: &dyn DomainDefinition,
        object_type: Arc<dyn ObjectType>,
    ) -> SfcResult<Self> {
        let children = object_type
            .metadata()
            .child_collections()
            .iter()
            .map(|def| {
                definition
                    .object_type(&def.element_type)
                    .map(|t| (def.backing, t))
                    .ok_or_else(|| SfcError::TypeNotFound {
                        domain: definition.name().to_string(),
                        type_name: def.element_type.clone(),
                    })
            })
            .collect::<SfcResult<Vec<_>>>()?;
        Ok(Self {
            object_type,
            children,
        })
    }

    pub(crate) fn assemble(
        self,
        domain: Weak<Domain>,
        key_chain: Arc<KeyChain>,
        parent: Weak<Instance>,
        state: ObjectState,
        collation: &Collation,
    ) -> Arc<Instance> {
        let metadata = self.object_type.metadata().clone();
        let mut properties = PropertyCollection::new(metadata.clone());
        seed_key_properties(&mut properties, &metadata, &key_chain.leaf());

        let children = self.children;
        Arc::new_cyclic(|owner: &Weak<Instance>| Instance {
            domain,
            object_type: self.object_type,
            key_chain,
            parent: RwLock::new(parent),
            state: RwLock::new(state),
            properties: RwLock::new(properties),
            children: children
                .into_iter()
                .map(|(backing, element)| {
                    new_collection(backing, owner.clone(), element, collation.clone())
                })
                .collect(),
        })
    }
}

/// Key fields are known without a round trip; record them as retrieved.
fn seed_key_properties(properties: &mut PropertyCollection, metadata: &TypeMetadata, key: &Key) {
    for (name, text) in key.fields() {
        if let Some(meta) = metadata.get(name) {
            // Only fails for unknown names, which `get` ruled out.
            let _ = properties.set_retrieved(name, value_from_key_text(meta.value_type, text));
        }
    }
}

impl Instance {
    pub fn object_type(&self) -> &Arc<dyn ObjectType> {
        &self.object_type
    }

    pub fn type_name(&self) -> &str {
        self.object_type.type_name()
    }

    pub fn metadata(&self) -> &Arc<TypeMetadata> {
        self.object_type.metadata()
    }

    pub fn key(&self) -> Key {
        self.key_chain.leaf()
    }

    pub fn key_chain(&self) -> &Arc<KeyChain> {
        &self.key_chain
    }

    pub fn urn(&self) -> Urn {
        self.key_chain.urn()
    }

    pub fn parent(&self) -> Option<Arc<Instance>> {
        self.parent.read().expect("instance lock poisoned").upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.key_chain.parent().is_none()
    }

    pub fn domain(&self) -> SfcResult<Arc<Domain>> {
        self.domain
            .upgrade()
            .ok_or_else(|| SfcError::DomainReleased(self.urn().to_string()))
    }

    pub fn state(&self) -> ObjectState {
        *self.state.read().expect("instance lock poisoned")
    }

    pub(crate) fn set_state(&self, state: ObjectState) {
        let mut slot = self.state.write().expect("instance lock poisoned");
        if *slot != state {
            trace!(urn = %self.key_chain, from = %*slot, to = %state, "state change");
            *slot = state;
        }
    }

    pub(crate) fn set_parent(&self, parent: Weak<Instance>) {
        *self.parent.write().expect("instance lock poisoned") = parent;
    }

    pub(crate) fn check_state(&self, expected: ObjectState) -> SfcResult<()> {
        let state = self.state();
        if state != expected {
            return Err(SfcError::InvalidState {
                urn: self.urn().to_string(),
                state,
                expected,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Read access to the property slots, without fetching.
    pub fn properties(&self) -> RwLockReadGuard<'_, PropertyCollection> {
        self.properties.read().expect("instance lock poisoned")
    }

    /// Value of `name`, fetched from the backing store on first access.
    ///
    /// Expensive properties are fetched on their own; any other property
    /// triggers a full initialization. Offline, the cached value is returned.
    pub fn property(&self, name: &str) -> SfcResult<Value> {
        let meta = self
            .metadata()
            .get(name)
            .ok_or_else(|| SfcError::UnknownProperty {
                type_name: self.type_name().to_string(),
                property: name.to_string(),
            })?
            .clone();
        {
            let props = self.properties();
            let slot = props.slot(name)?;
            if slot.retrieved || slot.dirty || !self.needs_fetch()? {
                return Ok(slot.value.clone());
            }
        }
        if meta.flags.contains(PropertyFlags::EXPENSIVE) {
            self.fetch_properties(&[meta.name.clone()])?;
        } else {
            self.initialize()?;
        }
        Ok(self.properties().value(name)?.clone())
    }

    fn needs_fetch(&self) -> SfcResult<bool> {
        let backed = matches!(
            self.state(),
            ObjectState::Existing | ObjectState::Recreate | ObjectState::ToBeDropped
        );
        Ok(backed && self.domain()?.mode() != ConnectionMode::Offline)
    }

    /// Client assignment. Marks the property dirty.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> SfcResult<()> {
        let meta = self
            .metadata()
            .get(name)
            .ok_or_else(|| SfcError::UnknownProperty {
                type_name: self.type_name().to_string(),
                property: name.to_string(),
            })?;
        let read_only = meta.is_key()
            || meta.flags.contains(PropertyFlags::COMPUTED)
            || (meta.flags.contains(PropertyFlags::READ_ONLY_AFTER_CREATION)
                && self.state() != ObjectState::Pending);
        if read_only {
            return Err(SfcError::ReadOnlyProperty {
                type_name: self.type_name().to_string(),
                property: name.to_string(),
            });
        }
        if self.state() == ObjectState::Dropped {
            return Err(SfcError::InvalidState {
                urn: self.urn().to_string(),
                state: ObjectState::Dropped,
                expected: ObjectState::Existing,
            });
        }
        self.properties
            .write()
            .expect("instance lock poisoned")
            .set(name, value.into())
    }

    pub fn is_dirty(&self) -> bool {
        self.properties().any_dirty()
    }

    /// Required properties must hold values.
    pub fn validate(&self) -> SfcResult<()> {
        let missing = self.properties().validate();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SfcError::MissingRequiredProperties {
                urn: self.urn().to_string(),
                properties: missing,
            })
        }
    }

    pub(crate) fn clear_dirty(&self) {
        self.properties
            .write()
            .expect("instance lock poisoned")
            .clear_dirty();
    }

    pub(crate) fn populate(&self, populator: &dyn Populator) {
        self.properties
            .write()
            .expect("instance lock poisoned")
            .populate(populator);
    }

    /// Replace the leaf key and the key properties that mirror it.
    pub(crate) fn rekey(&self, key: Key) -> SfcResult<()> {
        self.key_chain.set_leaf(key.clone())?;
        let mut props = self.properties.write().expect("instance lock poisoned");
        let metadata = self.object_type.metadata().clone();
        seed_key_properties(&mut props, &metadata, &key);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Backing-store reads
    // ------------------------------------------------------------------

    /// Read this object's eager properties from the backing store.
    ///
    /// Fails with [`SfcError::ObjectInitialization`] when the store has no
    /// row for this URN. A no-op offline.
    pub fn initialize(&self) -> SfcResult<()> {
        let fields = self.metadata().eager_property_names();
        if fields.is_empty() {
            return Ok(());
        }
        self.fetch_properties(&fields)
    }

    fn fetch_properties(&self, fields: &[String]) -> SfcResult<()> {
        let domain = self.domain()?;
        if domain.mode() == ConnectionMode::Offline {
            return Ok(());
        }
        let Some(conn) = domain.connection_context().connection() else {
            return Ok(());
        };
        let urn = self.urn();
        let request =
            Request::new(QueryExpression::new(urn.clone())).with_fields(fields.iter().cloned());
        let mut reader = conn.enumerator().get_data(&request)?;
        let table = ResultTable::load(reader.as_mut())?;
        let Some(row) = table.rows().first() else {
            return Err(SfcError::ObjectInitialization {
                urn: urn.to_string(),
            });
        };
        self.populate(&RowPopulator::new(table.columns(), row));
        trace!(%urn, fields = fields.len(), "properties fetched");
        Ok(())
    }

    /// Load one child level into the shadow of `collection`.
    ///
    /// Rows matching an already loaded item are merged into it (local edits
    /// win); other rows become new `Existing` instances.
    pub(crate) fn init_child_level(self: &Arc<Self>, collection: &dyn ChildCollection) -> SfcResult<()> {
        let domain = self.domain()?;
        let Some(conn) = domain.connection_context().connection() else {
            return Ok(());
        };
        let element = collection.object_type();
        let query = self.urn().child(UrnSegment::new(element.type_name()));
        let request = Request::new(QueryExpression::new(query))
            .with_fields(element.metadata().eager_property_names());
        let mut reader = conn.enumerator().get_data(&request)?;
        let table = ResultTable::load(reader.as_mut())?;

        let factory = collection.factory();
        for row in table.rows() {
            let populator = RowPopulator::new(table.columns(), row);
            let key = element.create_identity_key(&populator)?;
            let item = match collection.get_existing(&key) {
                Some(existing) => {
                    existing.populate(&populator);
                    existing
                }
                None => factory.create_populated(self, &populator, ObjectState::Existing)?,
            };
            collection.add_shadow(item)?;
        }
        debug!(owner = %self.key_chain, element = element.type_name(), rows = table.len(), "child level loaded");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Children
    // ------------------------------------------------------------------

    pub fn child_collections(&self) -> &[Arc<dyn ChildCollection>] {
        &self.children
    }

    /// The collection holding children of `element_type`.
    pub fn child_collection(&self, element_type: &str) -> SfcResult<Arc<dyn ChildCollection>> {
        self.children
            .iter()
            .find(|c| c.element_type() == element_type)
            .cloned()
            .ok_or_else(|| SfcError::TypeNotFound {
                domain: self
                    .key_chain
                    .root_key()
                    .domain()
                    .unwrap_or_default()
                    .to_string(),
                type_name: element_type.to_string(),
            })
    }

    /// The collection of `element_type` with its concrete backing, `None` if
    /// the type has no such collection or it uses a different backing.
    pub fn typed_collection<B: Backing + 'static>(&self, element_type: &str) -> Option<&Collection<B>> {
        self.children
            .iter()
            .find(|c| c.element_type() == element_type)
            .and_then(|c| c.as_any().downcast_ref::<Collection<B>>())
    }

    /// The collection this object belongs to in its parent.
    pub fn parent_collection(&self) -> SfcResult<Arc<dyn ChildCollection>> {
        let parent = self
            .parent()
            .ok_or_else(|| SfcError::MissingParent(self.urn().to_string()))?;
        parent.child_collection(self.type_name())
    }

    /// This object and every loaded descendant, parents before children.
    pub(crate) fn with_loaded_descendants(self: &Arc<Self>) -> Vec<Arc<Instance>> {
        let mut out = vec![self.clone()];
        let mut i = 0;
        while i < out.len() {
            let current = out[i].clone();
            for collection in current.child_collections() {
                out.extend(collection.loaded_items());
            }
            i += 1;
        }
        out
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("urn", &self.urn().to_string())
            .field("state", &self.state())
            .field("collections", &self.children.len())
            .finish()
    }
}
