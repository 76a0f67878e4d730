//! The per-type capability interface domains implement.

use std::fmt;
use std::sync::Arc;

use sfc_store::{Script, ScriptOp};
use sfc_types::{Key, TypeError, UrnSegment, Value, ValueType};

use crate::crud::{CrudAction, CrudKind};
use crate::error::SfcResult;
use crate::instance::Instance;
use crate::metadata::TypeMetadata;
use crate::properties::Populator;

/// Behavior of one object type: its metadata, how identity keys are derived,
/// and how CRUD actions are scripted.
///
/// Every method except [`ObjectType::metadata`] has a metadata-driven default.
pub trait ObjectType: Send + Sync + fmt::Debug {
    fn metadata(&self) -> &Arc<TypeMetadata>;

    fn type_name(&self) -> &str {
        self.metadata().type_name()
    }

    /// Build the identity key from key properties, in key order.
    fn create_identity_key(&self, populator: &dyn Populator) -> SfcResult<Key> {
        let metadata = self.metadata();
        let fields = metadata
            .key_properties()
            .into_iter()
            .map(|p| {
                populator
                    .value(&p.name)
                    .and_then(|v| v.to_key_text())
                    .map(|v| (p.name.clone(), v))
                    .ok_or_else(|| TypeError::MissingKeyField {
                        type_name: metadata.type_name().to_string(),
                        field: p.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Key::from_fields(metadata.type_name(), fields)?)
    }

    /// Read the identity key out of a URN segment.
    fn key_from_segment(&self, segment: &UrnSegment) -> SfcResult<Key> {
        Ok(Key::from_segment(
            segment,
            &self.metadata().key_field_names(),
        )?)
    }

    fn supports(&self, _action: CrudKind) -> bool {
        true
    }

    /// Whether a parent that is itself part of the operation scripts this
    /// type's `action` on its behalf.
    fn handled_by_parent(&self, action: CrudKind) -> bool {
        action == CrudKind::Drop
    }

    /// Script `action` for `instance`.
    fn script(&self, action: &CrudAction, instance: &Instance) -> SfcResult<Script> {
        let urn = instance.urn();
        let op = match action {
            CrudAction::Create => ScriptOp::Create {
                urn,
                properties: instance.properties().writable_values(),
            },
            CrudAction::Alter => ScriptOp::Alter {
                urn,
                properties: instance.properties().dirty_values(),
            },
            CrudAction::Drop => ScriptOp::Drop { urn },
            CrudAction::Rename { new_key } => ScriptOp::Rename {
                urn,
                new_leaf: new_key.urn_segment(),
            },
            CrudAction::Move { new_parent } => ScriptOp::Move {
                urn,
                new_parent: new_parent.urn(),
            },
        };
        Ok(Script::from(op))
    }
}

/// An [`ObjectType`] driven entirely by its metadata.
#[derive(Debug, Clone)]
pub struct MetadataType {
    metadata: Arc<TypeMetadata>,
}

impl MetadataType {
    pub fn new(metadata: TypeMetadata) -> Self {
        Self {
            metadata: Arc::new(metadata),
        }
    }
}

impl ObjectType for MetadataType {
    fn metadata(&self) -> &Arc<TypeMetadata> {
        &self.metadata
    }
}

/// Convert key text back into a value of the declared type.
pub(crate) fn value_from_key_text(value_type: ValueType, text: &str) -> Value {
    match value_type {
        ValueType::Int => text.parse().map(Value::Int).unwrap_or_else(|_| Value::from(text)),
        ValueType::Bool => text.parse().map(Value::Bool).unwrap_or_else(|_| Value::from(text)),
        _ => Value::from(text),
    }
}
