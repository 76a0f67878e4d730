//! Instance construction for one object type.

use std::sync::Arc;

use sfc_types::{Key, ObjectState};
use tracing::trace;

use crate::error::{SfcError, SfcResult};
use crate::instance::{Instance, InstanceParts};
use crate::key_chain::KeyChain;
use crate::object_type::ObjectType;
use crate::properties::Populator;

/// Creates instances of one type under a parent.
#[derive(Clone, Debug)]
pub struct ObjectFactory {
    object_type: Arc<dyn ObjectType>,
}

impl ObjectFactory {
    pub fn new(object_type: Arc<dyn ObjectType>) -> Self {
        Self { object_type }
    }

    pub fn object_type(&self) -> &Arc<dyn ObjectType> {
        &self.object_type
    }

    /// Build an instance whose identity key and properties come from
    /// `populator`. The instance is not added to any collection.
    pub fn create_populated(
        &self,
        parent: &Arc<Instance>,
        populator: &dyn Populator,
        state: ObjectState,
    ) -> SfcResult<Arc<Instance>> {
        let key = self.object_type.create_identity_key(populator)?;
        let instance = self.build(parent, key, state)?;
        instance.populate(populator);
        Ok(instance)
    }

    /// Build an instance that knows only its key. Other properties are
    /// fetched on first access.
    pub fn create_lazy(
        &self,
        parent: &Arc<Instance>,
        key: Key,
        state: ObjectState,
    ) -> SfcResult<Arc<Instance>> {
        self.build(parent, key, state)
    }

    fn build(&self, parent: &Arc<Instance>, key: Key, state: ObjectState) -> SfcResult<Arc<Instance>> {
        if key.type_name() != self.object_type.type_name() {
            return Err(SfcError::InvalidKeyChain(format!(
                "key {} does not identify a {}",
                key.urn_fragment(),
                self.object_type.type_name()
            )));
        }
        let domain = parent.domain()?;
        let parts = InstanceParts::prepare(domain.definition().as_ref(), self.object_type.clone())?;
        let chain = KeyChain::child(parent.key_chain().clone(), key)?;
        let instance = parts.assemble(
            Arc::downgrade(&domain),
            chain,
            Arc::downgrade(parent),
            state,
            domain.collation(),
        );
        trace!(urn = %instance.urn(), %state, "instance created");
        Ok(instance)
    }
}

