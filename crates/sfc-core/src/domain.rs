//! Domains: a registered object model plus one open root over a connection.

use std::fmt;
use std::sync::Arc;

use sfc_store::{
    ActiveQueriesMode, Connection, ConnectionContext, ConnectionMode, ExecutionResult, Script,
    StoreResult,
};
use sfc_types::{Key, ObjectState, Urn};
use tracing::{debug, info};

use crate::collation::Collation;
use crate::config::DomainConfig;
use crate::error::{SfcError, SfcResult};
use crate::events::{EventBus, ObjectEvent};
use crate::factory::ObjectFactory;
use crate::instance::{Instance, InstanceParts};
use crate::key_chain::KeyChain;
use crate::object_type::ObjectType;

/// The object model of one domain.
pub trait DomainDefinition: Send + Sync {
    fn name(&self) -> &str;

    /// Type name of the domain root.
    fn root_type(&self) -> &str;

    fn object_type(&self, type_name: &str) -> Option<Arc<dyn ObjectType>>;

    /// Whether lifecycle states gate operations. Without it, state checks
    /// are skipped and states are not advanced by CRUD.
    fn uses_state_management(&self) -> bool {
        true
    }

    /// Connection to stream a query on, given the domain's primary
    /// connection. `None` means the query must be cached.
    fn query_connection(
        &self,
        primary: &Arc<dyn Connection>,
        mode: ActiveQueriesMode,
    ) -> StoreResult<Option<Arc<dyn Connection>>> {
        match mode {
            ActiveQueriesMode::CachedQuery => Ok(None),
            ActiveQueriesMode::MultipleActiveQueries
                if primary.supports_multiple_active_readers() =>
            {
                Ok(Some(primary.clone()))
            }
            _ => primary.copy().map(Some),
        }
    }
}

/// An open domain: root object, connection context, and event hub.
pub struct Domain {
    definition: Arc<dyn DomainDefinition>,
    root: Arc<Instance>,
    context: ConnectionContext,
    events: EventBus,
    collation: Collation,
    config: DomainConfig,
}

impl Domain {
    /// Open `definition` with a root named `root_name`.
    ///
    /// Without a connection the domain is permanently offline. With one, the
    /// context starts online and then switches to `config.initial_mode`.
    pub fn open(
        definition: Arc<dyn DomainDefinition>,
        root_name: &str,
        connection: Option<Arc<dyn Connection>>,
        config: DomainConfig,
    ) -> SfcResult<Arc<Domain>> {
        let collation = Collation::from_config(&config.collation)?;
        let root_type = definition
            .object_type(definition.root_type())
            .ok_or_else(|| SfcError::TypeNotFound {
                domain: definition.name().to_string(),
                type_name: definition.root_type().to_string(),
            })?;
        let key = Key::domain_root(definition.name(), definition.root_type(), root_name)?;
        let chain = KeyChain::root(key)?;
        let parts = InstanceParts::prepare(definition.as_ref(), root_type)?;

        let context = match connection {
            Some(conn) => {
                let context = ConnectionContext::new(conn);
                context.set_mode(config.initial_mode)?;
                context
            }
            None => ConnectionContext::offline(),
        };

        let domain = Arc::new_cyclic(|weak| {
            let root = parts.assemble(
                weak.clone(),
                chain,
                std::sync::Weak::new(),
                ObjectState::Existing,
                &collation,
            );
            Domain {
                definition,
                root,
                context,
                events: EventBus::new(config.event_capacity),
                collation,
                config,
            }
        });
        info!(domain = domain.name(), root = %domain.root.urn(), mode = %domain.mode(), "domain opened");
        Ok(domain)
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<dyn DomainDefinition> {
        &self.definition
    }

    pub fn root(&self) -> &Arc<Instance> {
        &self.root
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    pub fn collation(&self) -> &Collation {
        &self.collation
    }

    pub fn connection_context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn mode(&self) -> ConnectionMode {
        self.context.mode()
    }

    pub fn set_mode(&self, mode: ConnectionMode) -> SfcResult<()> {
        Ok(self.context.set_mode(mode)?)
    }

    /// Execute queued scripts. Returns how many ran.
    pub fn flush(&self) -> SfcResult<usize> {
        Ok(self.context.flush_action_log()?)
    }

    /// Route `script` through the connection context.
    pub fn execute(&self, script: Script) -> SfcResult<ExecutionResult> {
        Ok(self.context.execute(script)?)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn publish(&self, event: ObjectEvent) {
        self.events.publish(event);
    }

    pub fn uses_state_management(&self) -> bool {
        self.config
            .state_management
            .unwrap_or_else(|| self.definition.uses_state_management())
    }

    pub fn object_type(&self, type_name: &str) -> SfcResult<Arc<dyn ObjectType>> {
        self.definition
            .object_type(type_name)
            .ok_or_else(|| SfcError::TypeNotFound {
                domain: self.name().to_string(),
                type_name: type_name.to_string(),
            })
    }

    pub fn factory(&self, type_name: &str) -> SfcResult<ObjectFactory> {
        self.object_type(type_name).map(ObjectFactory::new)
    }

    /// Connection for a streamed query under `mode`; `None` means cache the
    /// results. Always `None` offline.
    pub fn query_connection(&self, mode: ActiveQueriesMode) -> SfcResult<Option<Arc<dyn Connection>>> {
        if self.mode() == ConnectionMode::Offline || mode == ActiveQueriesMode::CachedQuery {
            return Ok(None);
        }
        let Some(primary) = self.context.connection() else {
            return Ok(None);
        };
        Ok(self.definition.query_connection(primary, mode)?)
    }

    /// Resolve a URN to an instance, loading each level on the way down.
    ///
    /// Returns `Ok(None)` when some level does not exist.
    pub fn get_object(&self, urn: &Urn) -> SfcResult<Option<Arc<Instance>>> {
        let segments = urn.segments();
        let Some(first) = segments.first() else {
            return Ok(None);
        };
        let root_urn = self.root.urn();
        let root_segment = root_urn.segments().first();
        if root_segment != Some(first) {
            return Err(SfcError::DomainNotFound(format!(
                "{urn} is not under {root_urn}"
            )));
        }

        let mut current = self.root.clone();
        for segment in &segments[1..] {
            let element = self.object_type(segment.type_name())?;
            let key = element.key_from_segment(segment)?;
            let collection = current.child_collection(segment.type_name())?;
            match collection.get_object_by_key(&key)? {
                Some(next) => current = next,
                None => {
                    debug!(%urn, missing = %segment, "object not found");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name())
            .field("root", &self.root.urn().to_string())
            .field("mode", &self.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use sfc_store::InMemoryStore;
    use sfc_types::Value;

    #[test]
    fn open_builds_an_existing_root() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        assert_eq!(domain.name(), CATALOG);
        assert_eq!(domain.root().urn(), root_urn());
        assert_eq!(domain.root().state(), ObjectState::Existing);
        assert!(domain.root().is_root());
        assert_eq!(domain.mode(), ConnectionMode::Online);
        assert_eq!(offline_catalog().mode(), ConnectionMode::Offline);
    }

    #[test]
    fn get_object_walks_levels() {
        let store = seeded_store();
        let domain = open_catalog(&store);

        let root = domain.get_object(&root_urn()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&root, domain.root()));

        let column = domain
            .get_object(&column_urn("sales", "dbo", "orders", "total"))
            .unwrap()
            .unwrap();
        assert_eq!(column.property("DataType").unwrap(), Value::from("decimal"));
        assert_eq!(column.urn(), column_urn("sales", "dbo", "orders", "total"));

        // The same lookup again hands back the loaded instance.
        let again = domain
            .get_object(&column_urn("sales", "dbo", "orders", "total"))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&column, &again));

        assert!(domain.get_object(&table_urn("sales", "dbo", "missing")).unwrap().is_none());
        assert!(domain.get_object(&column_urn("nope", "dbo", "t", "c")).unwrap().is_none());
    }

    #[test]
    fn get_object_rejects_foreign_roots() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let other = Urn::parse("Catalog[@Name='other']/Database[@Name='sales']").unwrap();
        assert!(matches!(domain.get_object(&other), Err(SfcError::DomainNotFound(_))));
        let foreign = Urn::parse("Server[@Name='main']").unwrap();
        assert!(matches!(domain.get_object(&foreign), Err(SfcError::DomainNotFound(_))));
    }

    #[test]
    fn query_connection_follows_mode() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let primary = domain.connection_context().connection().unwrap().id();

        assert!(domain.query_connection(ActiveQueriesMode::CachedQuery).unwrap().is_none());

        let single = domain
            .query_connection(ActiveQueriesMode::SingleActiveQuery)
            .unwrap()
            .unwrap();
        assert_ne!(single.id(), primary);
        assert_eq!(store.stats().open_clones, 1);

        // Without multiplexing, a multiple-reader request still needs a clone.
        let multiple = domain
            .query_connection(ActiveQueriesMode::MultipleActiveQueries)
            .unwrap()
            .unwrap();
        assert_ne!(multiple.id(), primary);

        store.refuse_clones(true);
        assert!(matches!(
            domain.query_connection(ActiveQueriesMode::SingleActiveQuery),
            Err(SfcError::Store(_))
        ));
    }

    #[test]
    fn multiplexed_connections_are_shared() {
        let store = InMemoryStore::new();
        store.insert(root_urn(), vec![]);
        let domain = Domain::open(
            Arc::new(CatalogDomain::new()),
            ROOT_NAME,
            Some(store.connect_multiplexed()),
            DomainConfig::default(),
        )
        .unwrap();
        let primary = domain.connection_context().connection().unwrap().id();
        let shared = domain
            .query_connection(ActiveQueriesMode::MultipleActiveQueries)
            .unwrap()
            .unwrap();
        assert_eq!(shared.id(), primary);
        assert_eq!(store.stats().open_clones, 0);
    }

    #[test]
    fn offline_domains_never_stream() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        domain.set_mode(ConnectionMode::Offline).unwrap();
        assert!(domain
            .query_connection(ActiveQueriesMode::SingleActiveQuery)
            .unwrap()
            .is_none());
        assert!(offline_catalog()
            .query_connection(ActiveQueriesMode::MultipleActiveQueries)
            .unwrap()
            .is_none());
    }

    #[test]
    fn state_management_config_overrides_definition() {
        let store = seeded_store();
        assert!(open_catalog(&store).uses_state_management());
        let config = DomainConfig {
            state_management: Some(false),
            ..Default::default()
        };
        assert!(!open_catalog_with(&store, config).uses_state_management());
    }

    #[test]
    fn unknown_types_are_reported() {
        let domain = offline_catalog();
        assert!(matches!(
            domain.factory("View"),
            Err(SfcError::TypeNotFound { ref type_name, .. }) if type_name == "View"
        ));
        assert_eq!(domain.factory("Login").unwrap().object_type().type_name(), "Login");
    }

    #[test]
    fn offline_mode_skips_lazy_fetches() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let sales = domain.get_object(&database_urn("sales")).unwrap().unwrap();
        domain.set_mode(ConnectionMode::Offline).unwrap();
        let before = store.stats().queries_issued;
        assert_eq!(sales.property("Description").unwrap(), Value::Null);
        assert_eq!(store.stats().queries_issued, before);
    }
}
