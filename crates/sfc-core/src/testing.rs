//! A small sample domain and a seeded store for tests.
//!
//! ```text
//! Catalog[@Name='main']
//! ├── Database        (sorted)      Name | Owner, SizeMb, Collation*, Description†
//! │   └── Table       (sorted)      Schema, Name | RowCount‡, Description
//! │       └── Column  (dictionary)  Name | DataType (required), Nullable
//! └── Login           (list)        Name | Enabled, DefaultDatabase
//!
//! * read-only after creation   † expensive   ‡ computed
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use sfc_store::InMemoryStore;
use sfc_types::{Urn, UrnSegment, Value, ValueType};

use crate::config::DomainConfig;
use crate::domain::{Domain, DomainDefinition};
use crate::metadata::{BackingKind, PropertyFlags, PropertyMetadata, TypeMetadata};
use crate::object_type::{MetadataType, ObjectType};

pub const CATALOG: &str = "Catalog";
pub const ROOT_NAME: &str = "main";

/// The sample domain definition.
#[derive(Debug)]
pub struct CatalogDomain {
    types: HashMap<String, Arc<dyn ObjectType>>,
}

impl CatalogDomain {
    pub fn new() -> Self {
        let text = |name: &str| PropertyMetadata::new(name, ValueType::Text);
        let types: Vec<TypeMetadata> = vec![
            TypeMetadata::new(CATALOG)
                .property(text("Name").key(0))
                .child("Database", BackingKind::Sorted)
                .child("Login", BackingKind::List),
            TypeMetadata::new("Database")
                .property(text("Name").key(0))
                .property(text("Owner"))
                .property(PropertyMetadata::new("SizeMb", ValueType::Int))
                .property(text("Collation").with_flags(PropertyFlags::READ_ONLY_AFTER_CREATION))
                .property(text("Description").with_flags(PropertyFlags::EXPENSIVE))
                .child("Table", BackingKind::Sorted),
            TypeMetadata::new("Table")
                .property(text("Schema").key(0))
                .property(text("Name").key(1))
                .property(
                    PropertyMetadata::new("RowCount", ValueType::Int)
                        .with_flags(PropertyFlags::COMPUTED),
                )
                .property(text("Description"))
                .child("Column", BackingKind::Dictionary),
            TypeMetadata::new("Column")
                .property(text("Name").key(0))
                .property(text("DataType").with_flags(PropertyFlags::REQUIRED))
                .property(PropertyMetadata::new("Nullable", ValueType::Bool)),
            TypeMetadata::new("Login")
                .property(text("Name").key(0))
                .property(PropertyMetadata::new("Enabled", ValueType::Bool))
                .property(text("DefaultDatabase")),
        ];
        let types = types
            .into_iter()
            .map(|m| {
                let t: Arc<dyn ObjectType> = Arc::new(MetadataType::new(m));
                (t.type_name().to_string(), t)
            })
            .collect();
        Self { types }
    }
}

impl Default for CatalogDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainDefinition for CatalogDomain {
    fn name(&self) -> &str {
        CATALOG
    }

    fn root_type(&self) -> &str {
        CATALOG
    }

    fn object_type(&self, type_name: &str) -> Option<Arc<dyn ObjectType>> {
        self.types.get(type_name).cloned()
    }
}

fn named(type_name: &str, name: &str) -> UrnSegment {
    UrnSegment::new(type_name).with_attribute("Name", name)
}

pub fn root_urn() -> Urn {
    Urn::from_segments(vec![named(CATALOG, ROOT_NAME)])
}

pub fn database_urn(database: &str) -> Urn {
    root_urn().child(named("Database", database))
}

pub fn table_urn(database: &str, schema: &str, table: &str) -> Urn {
    database_urn(database).child(named("Table", table).with_attribute("Schema", schema))
}

pub fn column_urn(database: &str, schema: &str, table: &str, column: &str) -> Urn {
    table_urn(database, schema, table).child(named("Column", column))
}

pub fn login_urn(login: &str) -> Urn {
    root_urn().child(named("Login", login))
}

/// A store holding the root, databases `sales` and `hr`, three tables in
/// `sales`, two columns on `sales/dbo.orders`, and logins `sa` and `reader`.
pub fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert(root_urn(), vec![]);
    store.insert(
        database_urn("sales"),
        vec![
            ("Owner".into(), Value::from("alice")),
            ("SizeMb".into(), Value::Int(100)),
            ("Collation".into(), Value::from("Latin1_General")),
            ("Description".into(), Value::from("Sales data")),
        ],
    );
    store.insert(
        database_urn("hr"),
        vec![
            ("Owner".into(), Value::from("bob")),
            ("SizeMb".into(), Value::Int(20)),
        ],
    );
    for (schema, table, rows) in [("dbo", "orders", 10), ("dbo", "customers", 3), ("audit", "log", 0)] {
        store.insert(
            table_urn("sales", schema, table),
            vec![("RowCount".into(), Value::Int(rows))],
        );
    }
    store.insert(
        column_urn("sales", "dbo", "orders", "id"),
        vec![
            ("DataType".into(), Value::from("int")),
            ("Nullable".into(), Value::Bool(false)),
        ],
    );
    store.insert(
        column_urn("sales", "dbo", "orders", "total"),
        vec![
            ("DataType".into(), Value::from("decimal")),
            ("Nullable".into(), Value::Bool(true)),
        ],
    );
    store.insert(login_urn("sa"), vec![("Enabled".into(), Value::Bool(true))]);
    store.insert(
        login_urn("reader"),
        vec![
            ("Enabled".into(), Value::Bool(false)),
            ("DefaultDatabase".into(), Value::from("hr")),
        ],
    );
    store
}

/// Open the catalog online over a fresh primary connection to `store`.
pub fn open_catalog(store: &InMemoryStore) -> Arc<Domain> {
    open_catalog_with(store, DomainConfig::default())
}

pub fn open_catalog_with(store: &InMemoryStore, config: DomainConfig) -> Arc<Domain> {
    Domain::open(
        Arc::new(CatalogDomain::new()),
        ROOT_NAME,
        Some(store.connect()),
        config,
    )
    .expect("catalog domain opens")
}

/// The catalog with no connection at all.
pub fn offline_catalog() -> Arc<Domain> {
    Domain::open(
        Arc::new(CatalogDomain::new()),
        ROOT_NAME,
        None,
        DomainConfig::default(),
    )
    .expect("catalog domain opens")
}
