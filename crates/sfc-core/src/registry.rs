//! Process-wide lookup of domain definitions.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use sfc_store::Connection;
use sfc_types::Urn;
use tracing::info;

use crate::config::DomainConfig;
use crate::domain::{Domain, DomainDefinition};
use crate::error::{SfcError, SfcResult};
use crate::object_type::ObjectType;

/// Domain definitions by name.
#[derive(Default)]
pub struct DomainRegistry {
    domains: RwLock<BTreeMap<String, Arc<dyn DomainDefinition>>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, definition: Arc<dyn DomainDefinition>) -> SfcResult<()> {
        let mut domains = self.domains.write().expect("registry lock poisoned");
        let name = definition.name().to_string();
        if domains.contains_key(&name) {
            return Err(SfcError::DomainAlreadyRegistered(name));
        }
        info!(domain = %name, root = definition.root_type(), "domain registered");
        domains.insert(name, definition);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn DomainDefinition>> {
        self.domains
            .write()
            .expect("registry lock poisoned")
            .remove(name)
    }

    pub fn domain(&self, name: &str) -> SfcResult<Arc<dyn DomainDefinition>> {
        self.domains
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| SfcError::DomainNotFound(name.to_string()))
    }

    pub fn resolve_type(&self, domain: &str, type_name: &str) -> SfcResult<Arc<dyn ObjectType>> {
        self.domain(domain)?
            .object_type(type_name)
            .ok_or_else(|| SfcError::TypeNotFound {
                domain: domain.to_string(),
                type_name: type_name.to_string(),
            })
    }

    /// The domain whose root type heads `urn`.
    pub fn domain_for_urn(&self, urn: &Urn) -> SfcResult<Arc<dyn DomainDefinition>> {
        let root_type = urn
            .root_type()
            .ok_or_else(|| SfcError::DomainNotFound(urn.to_string()))?;
        self.domains
            .read()
            .expect("registry lock poisoned")
            .values()
            .find(|d| d.root_type() == root_type)
            .cloned()
            .ok_or_else(|| SfcError::DomainNotFound(urn.to_string()))
    }

    /// Registered domain names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.domains
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Open the registered domain `name`.
    pub fn open(
        &self,
        name: &str,
        root_name: &str,
        connection: Option<Arc<dyn Connection>>,
        config: DomainConfig,
    ) -> SfcResult<Arc<Domain>> {
        Domain::open(self.domain(name)?, root_name, connection, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seeded_store, CatalogDomain};

    fn registry() -> DomainRegistry {
        let registry = DomainRegistry::new();
        registry.register(Arc::new(CatalogDomain::new())).unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = registry();
        let err = registry.register(Arc::new(CatalogDomain::new())).unwrap_err();
        assert!(matches!(err, SfcError::DomainAlreadyRegistered(ref n) if n == "Catalog"));
    }

    #[test]
    fn resolve_types() {
        let registry = registry();
        assert_eq!(registry.resolve_type("Catalog", "Table").unwrap().type_name(), "Table");
        assert!(matches!(
            registry.resolve_type("Catalog", "View"),
            Err(SfcError::TypeNotFound { .. })
        ));
        assert!(matches!(
            registry.resolve_type("Other", "Table"),
            Err(SfcError::DomainNotFound(_))
        ));
    }

    #[test]
    fn domain_for_urn_matches_root_type() {
        let registry = registry();
        let urn = Urn::parse("Catalog[@Name='main']/Database[@Name='sales']").unwrap();
        assert_eq!(registry.domain_for_urn(&urn).unwrap().name(), "Catalog");
        let foreign = Urn::parse("Server[@Name='x']").unwrap();
        assert!(registry.domain_for_urn(&foreign).is_err());
    }

    #[test]
    fn open_and_unregister() {
        let registry = registry();
        let store = seeded_store();
        let domain = registry
            .open("Catalog", "main", Some(store.connect()), DomainConfig::default())
            .unwrap();
        assert_eq!(domain.root().type_name(), "Catalog");
        assert_eq!(registry.names(), vec!["Catalog".to_string()]);
        assert!(registry.unregister("Catalog").is_some());
        assert!(registry.open("Catalog", "main", None, DomainConfig::default()).is_err());
    }
}
