//! Per-instance property storage.

use std::sync::Arc;

use sfc_types::Value;

use crate::error::{SfcError, SfcResult};
use crate::metadata::{PropertyFlags, TypeMetadata};

/// One storage slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertySlot {
    pub value: Value,
    /// Set by a client and not yet written to the backing store.
    pub dirty: bool,
    /// Holds a value read from (or confirmed by) the backing store.
    pub retrieved: bool,
}

/// Source of property values for populating an instance.
pub trait Populator {
    /// Value of `property`, `None` if the source does not carry it.
    fn value(&self, property: &str) -> Option<Value>;

    /// Whether populated values count as client edits.
    fn is_client_supplied(&self) -> bool {
        false
    }
}

/// A query-result row: parallel column names and values.
#[derive(Clone, Copy, Debug)]
pub struct RowPopulator<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowPopulator<'a> {
    pub fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }
}

impl Populator for RowPopulator<'_> {
    fn value(&self, property: &str) -> Option<Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(property))
            .and_then(|i| self.values.get(i).cloned())
    }
}

/// Client-supplied values for a new object. Populated slots start dirty.
#[derive(Clone, Debug, Default)]
pub struct PropertyValues(Vec<(String, Value)>);

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }
}

impl Populator for PropertyValues {
    fn value(&self, property: &str) -> Option<Value> {
        self.0
            .iter()
            .rev()
            .find(|(n, _)| n == property)
            .map(|(_, v)| v.clone())
    }

    fn is_client_supplied(&self) -> bool {
        true
    }
}

/// Property values of one instance, one slot per metadata property.
#[derive(Clone, Debug)]
pub struct PropertyCollection {
    metadata: Arc<TypeMetadata>,
    slots: Vec<PropertySlot>,
}

impl PropertyCollection {
    pub fn new(metadata: Arc<TypeMetadata>) -> Self {
        let slots = vec![PropertySlot::default(); metadata.slot_count()];
        Self { metadata, slots }
    }

    pub fn metadata(&self) -> &Arc<TypeMetadata> {
        &self.metadata
    }

    fn slot_index(&self, name: &str) -> SfcResult<usize> {
        self.metadata
            .index_of(name)
            .ok_or_else(|| SfcError::UnknownProperty {
                type_name: self.metadata.type_name().to_string(),
                property: name.to_string(),
            })
    }

    pub fn slot(&self, name: &str) -> SfcResult<&PropertySlot> {
        let i = self.slot_index(name)?;
        Ok(&self.slots[i])
    }

    pub fn value(&self, name: &str) -> SfcResult<&Value> {
        self.slot(name).map(|s| &s.value)
    }

    /// Client assignment: marks the slot dirty.
    pub fn set(&mut self, name: &str, value: Value) -> SfcResult<()> {
        let i = self.slot_index(name)?;
        let slot = &mut self.slots[i];
        slot.value = value;
        slot.dirty = true;
        Ok(())
    }

    /// Value confirmed by the backing store: clean and retrieved.
    pub fn set_retrieved(&mut self, name: &str, value: Value) -> SfcResult<()> {
        let i = self.slot_index(name)?;
        self.slots[i] = PropertySlot {
            value,
            dirty: false,
            retrieved: true,
        };
        Ok(())
    }

    pub fn is_dirty(&self, name: &str) -> SfcResult<bool> {
        self.slot(name).map(|s| s.dirty)
    }

    pub fn is_retrieved(&self, name: &str) -> SfcResult<bool> {
        self.slot(name).map(|s| s.retrieved)
    }

    pub fn any_dirty(&self) -> bool {
        self.slots.iter().any(|s| s.dirty)
    }

    /// Dirty properties with their values, in slot order.
    pub fn dirty_values(&self) -> Vec<(String, Value)> {
        self.iter()
            .filter(|(_, s)| s.dirty)
            .map(|(n, s)| (n.to_string(), s.value.clone()))
            .collect()
    }

    /// Every non-null, writable property, in slot order.
    pub fn writable_values(&self) -> Vec<(String, Value)> {
        self.metadata
            .properties()
            .iter()
            .zip(&self.slots)
            .filter(|(m, s)| m.is_writable() && !s.value.is_null())
            .map(|(m, s)| (m.name.clone(), s.value.clone()))
            .collect()
    }

    pub fn clear_dirty(&mut self) {
        for slot in &mut self.slots {
            if slot.dirty {
                slot.dirty = false;
                slot.retrieved = true;
            }
        }
    }

    /// Fill slots from `populator`. Dirty slots are left alone unless the
    /// populator is client-supplied.
    pub fn populate(&mut self, populator: &dyn Populator) {
        let client = populator.is_client_supplied();
        for (meta, slot) in self.metadata.properties().iter().zip(self.slots.iter_mut()) {
            let Some(value) = populator.value(&meta.name) else {
                continue;
            };
            if client {
                slot.value = value;
                slot.dirty = true;
            } else if !slot.dirty {
                *slot = PropertySlot {
                    value,
                    dirty: false,
                    retrieved: true,
                };
            }
        }
    }

    /// Names of required properties without a value.
    pub fn validate(&self) -> Vec<String> {
        self.metadata
            .properties()
            .iter()
            .zip(&self.slots)
            .filter(|(m, s)| {
                m.flags.contains(PropertyFlags::REQUIRED)
                    && !m.flags.contains(PropertyFlags::COMPUTED)
                    && s.value.is_null()
            })
            .map(|(m, _)| m.name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertySlot)> {
        self.metadata
            .properties()
            .iter()
            .map(|m| m.name.as_str())
            .zip(&self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadata;
    use sfc_types::ValueType;

    fn collection() -> PropertyCollection {
        PropertyCollection::new(Arc::new(
            TypeMetadata::new("Column")
                .property(PropertyMetadata::new("Name", ValueType::Text).key(0))
                .property(
                    PropertyMetadata::new("DataType", ValueType::Text)
                        .with_flags(PropertyFlags::REQUIRED),
                )
                .property(PropertyMetadata::new("Nullable", ValueType::Bool)),
        ))
    }

    #[test]
    fn set_marks_dirty() {
        let mut p = collection();
        p.set("Nullable", Value::Bool(true)).unwrap();
        assert!(p.is_dirty("Nullable").unwrap());
        assert!(!p.is_retrieved("Nullable").unwrap());
        assert_eq!(p.dirty_values(), vec![("Nullable".to_string(), Value::Bool(true))]);
        p.clear_dirty();
        assert!(!p.any_dirty());
    }

    #[test]
    fn unknown_property_is_an_error() {
        let mut p = collection();
        assert!(matches!(
            p.set("Bogus", Value::Null),
            Err(SfcError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn row_population_skips_dirty_slots() {
        let mut p = collection();
        p.set("DataType", "int".into()).unwrap();
        let columns = vec!["Urn".to_string(), "DATATYPE".to_string(), "Nullable".to_string()];
        let values = vec![Value::Null, Value::from("bigint"), Value::Bool(false)];
        p.populate(&RowPopulator::new(&columns, &values));
        assert_eq!(p.value("DataType").unwrap(), &Value::from("int"));
        assert_eq!(p.value("Nullable").unwrap(), &Value::Bool(false));
        assert!(p.is_retrieved("Nullable").unwrap());
        assert!(!p.is_retrieved("Name").unwrap());
    }

    #[test]
    fn client_population_is_dirty() {
        let mut p = collection();
        p.populate(&PropertyValues::new().with("Name", "id").with("DataType", "int"));
        assert!(p.is_dirty("Name").unwrap());
        assert!(p.validate().is_empty());
    }

    #[test]
    fn validate_reports_missing_required() {
        assert_eq!(collection().validate(), vec!["DataType".to_string()]);
    }
}
