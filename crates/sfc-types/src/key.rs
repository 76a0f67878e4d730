//! Identity keys.
//!
//! A [`Key`] is the set of attributes that distinguishes an object from its
//! siblings under one parent. Keys are immutable values: equality and hashing
//! are structural over type, kind, and every field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::urn::UrnSegment;

/// Schema used when a schema-qualified key is built without one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Whether a key sits at a domain root or below one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// Root of the named domain. Only the first level of a key chain has this kind.
    DomainRoot { domain: String },
    Child,
}

/// Identity key of a single object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    type_name: String,
    kind: KeyKind,
    fields: Vec<(String, String)>,
}

impl Key {
    /// A key identified by `Name` alone.
    pub fn named(type_name: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidKey("name must not be empty".into()));
        }
        Self::from_fields(type_name, vec![("Name".to_string(), name)])
    }

    /// A key identified by `Schema` and `Name`. Both must be non-empty.
    pub fn schema_named(
        type_name: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let (schema, name) = (schema.into(), name.into());
        if schema.is_empty() {
            return Err(TypeError::InvalidKey("schema must not be empty".into()));
        }
        if name.is_empty() {
            return Err(TypeError::InvalidKey("name must not be empty".into()));
        }
        Self::from_fields(
            type_name,
            vec![("Schema".to_string(), schema), ("Name".to_string(), name)],
        )
    }

    /// [`Key::schema_named`] with the [`DEFAULT_SCHEMA`].
    pub fn schema_named_default(
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        Self::schema_named(type_name, DEFAULT_SCHEMA, name)
    }

    /// A key over arbitrary fields, in key order.
    pub fn from_fields(
        type_name: impl Into<String>,
        fields: Vec<(String, String)>,
    ) -> Result<Self, TypeError> {
        let type_name = type_name.into();
        if type_name.is_empty() {
            return Err(TypeError::InvalidKey("type name must not be empty".into()));
        }
        if fields.is_empty() {
            return Err(TypeError::InvalidKey(format!(
                "key for {type_name} has no fields"
            )));
        }
        if let Some((name, _)) = fields.iter().find(|(name, _)| name.is_empty()) {
            return Err(TypeError::InvalidKey(format!(
                "key for {type_name} has an unnamed field '{name}'"
            )));
        }
        Ok(Self {
            type_name,
            kind: KeyKind::Child,
            fields,
        })
    }

    /// The key of a domain root object.
    pub fn domain_root(
        domain: impl Into<String>,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let domain = domain.into();
        if domain.is_empty() {
            return Err(TypeError::InvalidKey("domain name must not be empty".into()));
        }
        let mut key = Self::named(type_name, name)?;
        key.kind = KeyKind::DomainRoot { domain };
        Ok(key)
    }

    /// Extract a key from a URN segment, reading `key_fields` in order.
    pub fn from_segment(segment: &UrnSegment, key_fields: &[&str]) -> Result<Self, TypeError> {
        let fields = key_fields
            .iter()
            .map(|field| {
                segment
                    .attribute(field)
                    .map(|v| (field.to_string(), v.to_string()))
                    .ok_or_else(|| TypeError::MissingKeyField {
                        type_name: segment.type_name().to_string(),
                        field: field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_fields(segment.type_name(), fields)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> &KeyKind {
        &self.kind
    }

    pub fn is_domain_root(&self) -> bool {
        matches!(self.kind, KeyKind::DomainRoot { .. })
    }

    /// Domain name for root keys.
    pub fn domain(&self) -> Option<&str> {
        match &self.kind {
            KeyKind::DomainRoot { domain } => Some(domain),
            KeyKind::Child => None,
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn urn_segment(&self) -> UrnSegment {
        self.fields
            .iter()
            .fold(UrnSegment::new(self.type_name.clone()), |seg, (n, v)| {
                seg.with_attribute(n.clone(), v.clone())
            })
    }

    /// The URN segment text, e.g. `Table[@Name='orders' and @Schema='dbo']`.
    pub fn urn_fragment(&self) -> String {
        self.urn_segment().to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let KeyKind::DomainRoot { domain } = &self.kind {
            write!(f, "{domain},")?;
        }
        for (i, (_, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &Key) -> u64 {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    #[test]
    fn display_text_per_shape() {
        assert_eq!(Key::named("Login", "sa").unwrap().to_string(), "sa");
        assert_eq!(
            Key::schema_named("Table", "sales", "orders").unwrap().to_string(),
            "sales.orders"
        );
        assert_eq!(
            Key::domain_root("Catalog", "Catalog", "main").unwrap().to_string(),
            "Catalog,main"
        );
    }

    #[test]
    fn default_schema_is_dbo() {
        let key = Key::schema_named_default("Table", "orders").unwrap();
        assert_eq!(key.field("Schema"), Some(DEFAULT_SCHEMA));
        assert_eq!(key.field("Name"), Some("orders"));
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert!(Key::named("Login", "").is_err());
        assert!(Key::schema_named("Table", "", "orders").is_err());
        assert!(Key::schema_named("Table", "dbo", "").is_err());
        assert!(Key::from_fields("Table", vec![]).is_err());
        assert!(Key::domain_root("", "Catalog", "main").is_err());
    }

    #[test]
    fn fragment_escapes_quotes() {
        let key = Key::named("Login", "o'brien").unwrap();
        assert_eq!(key.urn_fragment(), "Login[@Name='o''brien']");
    }

    #[test]
    fn from_segment_reads_fields_in_key_order() {
        let key = Key::schema_named("Table", "hr", "staff").unwrap();
        let parsed = Key::from_segment(&key.urn_segment(), &["Schema", "Name"]).unwrap();
        assert_eq!(parsed, key);

        let err = Key::from_segment(&UrnSegment::new("Table"), &["Name"]).unwrap_err();
        assert!(matches!(err, TypeError::MissingKeyField { .. }));
    }

    #[test]
    fn root_and_child_keys_differ() {
        let root = Key::domain_root("Catalog", "Catalog", "main").unwrap();
        let child = Key::named("Catalog", "main").unwrap();
        assert_ne!(root, child);
        assert!(root.is_domain_root());
        assert_eq!(root.domain(), Some("Catalog"));
    }

    proptest! {
        #[test]
        fn equality_agrees_with_hash(a in "[a-z]{1,4}", b in "[a-z]{1,4}") {
            let ka = Key::named("Login", a.clone()).unwrap();
            let kb = Key::named("Login", b.clone()).unwrap();
            prop_assert_eq!(ka == kb, a == b);
            if ka == kb {
                prop_assert_eq!(hash_of(&ka), hash_of(&kb));
            }
        }
    }
}
