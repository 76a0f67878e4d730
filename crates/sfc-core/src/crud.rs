//! Create, alter, drop, rename, and move.
//!
//! Every operation goes through one worker:
//!
//! 1. check the object's state against the operation's required state
//! 2. collect the object and its loaded descendants
//! 3. script them and route the script through the connection context
//!    (offline, a create only checks for duplicates)
//! 4. advance states, clear dirty flags, and raise per-object events
//! 5. apply the structural change to collections (add, rename, move, remove)

use std::fmt;
use std::sync::Arc;

use sfc_store::{ConnectionMode, Script};
use sfc_types::{Key, ObjectState, Urn};
use tracing::{debug, info};

use crate::domain::Domain;
use crate::error::{SfcError, SfcResult};
use crate::events::{EventKind, ObjectEvent};
use crate::instance::Instance;

/// Kind of a CRUD operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CrudKind {
    Create,
    Alter,
    Drop,
    Rename,
    Move,
}

impl fmt::Display for CrudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrudKind::Create => "create",
            CrudKind::Alter => "alter",
            CrudKind::Drop => "drop",
            CrudKind::Rename => "rename",
            CrudKind::Move => "move",
        };
        f.write_str(s)
    }
}

/// A CRUD operation with its arguments.
#[derive(Clone, Debug)]
pub enum CrudAction {
    Create,
    Alter,
    Drop,
    Rename { new_key: Key },
    Move { new_parent: Arc<Instance> },
}

impl CrudAction {
    pub fn kind(&self) -> CrudKind {
        match self {
            CrudAction::Create => CrudKind::Create,
            CrudAction::Alter => CrudKind::Alter,
            CrudAction::Drop => CrudKind::Drop,
            CrudAction::Rename { .. } => CrudKind::Rename,
            CrudAction::Move { .. } => CrudKind::Move,
        }
    }
}

impl Instance {
    /// Create the object in the backing store and add it to its parent's
    /// collection. The object must be `Pending` and carry every required
    /// property.
    pub fn create(self: &Arc<Self>) -> SfcResult<()> {
        self.validate()?;
        self.crud_worker(CrudAction::Create, ObjectState::Pending, ObjectState::Existing)
    }

    /// Write dirty properties, and apply pending creates and drops of loaded
    /// descendants.
    pub fn alter(self: &Arc<Self>) -> SfcResult<()> {
        self.crud_worker(CrudAction::Alter, ObjectState::Existing, ObjectState::Existing)
    }

    /// Drop the object and its descendants.
    pub fn drop(self: &Arc<Self>) -> SfcResult<()> {
        self.crud_worker(CrudAction::Drop, ObjectState::Existing, ObjectState::Dropped)
    }

    pub fn rename(self: &Arc<Self>, new_key: Key) -> SfcResult<()> {
        let collection = self.parent_collection()?;
        collection.ensure_initialized()?;
        if new_key.type_name() != self.type_name() {
            return Err(SfcError::InvalidRename(format!(
                "key {} is not a {} key",
                new_key.urn_fragment(),
                self.type_name()
            )));
        }
        if collection.get_existing(&new_key).is_some() {
            return Err(SfcError::InvalidRename(format!(
                "{} already exists under {}",
                new_key,
                self.parent().map(|p| p.urn().to_string()).unwrap_or_default()
            )));
        }
        self.crud_worker(
            CrudAction::Rename { new_key },
            ObjectState::Existing,
            ObjectState::Existing,
        )
    }

    /// Move under `new_parent`. The object takes the new parent's state.
    pub fn move_to(self: &Arc<Self>, new_parent: &Arc<Instance>) -> SfcResult<()> {
        if Arc::ptr_eq(self, new_parent) || self.key_chain().is_ancestor_of(new_parent.key_chain()) {
            return Err(SfcError::InvalidMove(format!(
                "{} cannot move below itself",
                self.urn()
            )));
        }
        let destination = new_parent.child_collection(self.type_name()).map_err(|_| {
            SfcError::InvalidMove(format!(
                "{} cannot hold a {}",
                new_parent.urn(),
                self.type_name()
            ))
        })?;
        destination.ensure_initialized()?;
        if destination.get_existing(&self.key()).is_some() {
            return Err(SfcError::InvalidMove(format!(
                "{} already exists under {}",
                self.key(),
                new_parent.urn()
            )));
        }
        let state = new_parent.state();
        self.crud_worker(
            CrudAction::Move {
                new_parent: new_parent.clone(),
            },
            state,
            state,
        )
    }

    /// Mark the object to be dropped by the next `alter` of an ancestor, or
    /// clear that mark.
    pub fn mark_for_drop(&self, drop_on_alter: bool) -> SfcResult<()> {
        let state = self.state();
        if !matches!(state, ObjectState::Existing | ObjectState::ToBeDropped) {
            return Err(SfcError::InvalidState {
                urn: self.urn().to_string(),
                state,
                expected: ObjectState::Existing,
            });
        }
        if drop_on_alter {
            self.set_state(ObjectState::ToBeDropped);
        } else if state == ObjectState::ToBeDropped {
            self.set_state(ObjectState::Existing);
        }
        Ok(())
    }

    /// Re-read properties from the backing store. Dirty values are kept.
    pub fn refresh(self: &Arc<Self>) -> SfcResult<()> {
        if self.state() == ObjectState::Recreate {
            self.set_state(ObjectState::Existing);
        }
        if self.domain()?.uses_state_management() {
            self.check_state(ObjectState::Existing)?;
        }
        self.initialize()
    }

    fn crud_worker(
        self: &Arc<Self>,
        action: CrudAction,
        required: ObjectState,
        final_state: ObjectState,
    ) -> SfcResult<()> {
        let kind = action.kind();
        let domain = self.domain()?;
        let state_management = domain.uses_state_management();

        let parent = self
            .parent()
            .ok_or_else(|| SfcError::MissingParent(self.urn().to_string()))?;
        if state_management {
            self.check_state(required)?;
        }
        if !self.object_type().supports(kind) {
            return Err(SfcError::NotScriptable {
                type_name: self.type_name().to_string(),
                action: kind,
            });
        }

        let affected = self.with_loaded_descendants();
        let old_urn = self.urn();

        if domain.mode() == ConnectionMode::Offline {
            if kind == CrudKind::Create {
                let collection = parent.child_collection(self.type_name())?;
                if let Some(existing) = collection.get_existing(&self.key()) {
                    if !Arc::ptr_eq(&existing, self) {
                        return Err(SfcError::CrudFailed {
                            operation: kind,
                            urn: old_urn.to_string(),
                            reason: "an object with this key already exists".into(),
                        });
                    }
                }
            }
        } else {
            let script = self.accumulate_script(&affected, &action)?;
            debug!(urn = %old_urn, %kind, ops = script.len(), "executing crud script");
            domain
                .execute(script)
                .map_err(|e| SfcError::CrudFailed {
                    operation: kind,
                    urn: old_urn.to_string(),
                    reason: e.to_string(),
                })?;
        }

        for object in &affected {
            if state_management {
                if object.state() == ObjectState::ToBeDropped {
                    object.set_state(ObjectState::Dropped);
                    let parent_live = object
                        .parent()
                        .is_some_and(|p| p.state() != ObjectState::Dropped);
                    if parent_live {
                        if let Ok(collection) = object.parent_collection() {
                            collection.remove_element(object);
                        }
                    }
                } else {
                    object.set_state(final_state);
                }
            }
            if matches!(kind, CrudKind::Create | CrudKind::Alter) {
                object.clear_dirty();
            }
            let event = match kind {
                CrudKind::Create => Some(EventKind::Created),
                CrudKind::Alter => Some(EventKind::Altered),
                CrudKind::Drop => Some(EventKind::Dropped),
                CrudKind::Rename | CrudKind::Move => None,
            };
            if let Some(event) = event {
                domain.publish(ObjectEvent::new(event, object));
            }
        }

        self.post_crud(&domain, &action, old_urn)?;
        info!(urn = %self.urn(), %kind, objects = affected.len(), "crud complete");
        Ok(())
    }

    /// Script for the whole operation, parents before children. Drops run
    /// children first.
    fn accumulate_script(
        self: &Arc<Self>,
        affected: &[Arc<Instance>],
        action: &CrudAction,
    ) -> SfcResult<Script> {
        let kind = action.kind();
        let is_affected = |candidate: &Arc<Instance>| affected.iter().any(|a| Arc::ptr_eq(a, candidate));

        let mut ordered: Vec<&Arc<Instance>> = affected.iter().collect();
        if kind == CrudKind::Drop {
            ordered.reverse();
        }

        let mut script = Script::new();
        for object in ordered {
            if Arc::ptr_eq(object, self) {
                script.append(object.script_for(action)?);
                continue;
            }
            let parent_affected = object.parent().is_some_and(|p| is_affected(&p));
            if parent_affected && object.object_type().handled_by_parent(kind) {
                continue;
            }
            match (kind, object.state()) {
                (CrudKind::Create, ObjectState::Pending) => {
                    script.append(object.script_for(&CrudAction::Create)?);
                }
                (CrudKind::Drop, _) => {
                    script.append(object.script_for(&CrudAction::Drop)?);
                }
                (CrudKind::Alter, ObjectState::ToBeDropped) => {
                    script.append(object.script_for(&CrudAction::Drop)?);
                }
                (CrudKind::Alter, ObjectState::Pending) => {
                    script.append(object.script_for(&CrudAction::Create)?);
                }
                (CrudKind::Alter, ObjectState::Recreate) => {
                    script.append(object.script_for(&CrudAction::Drop)?);
                    script.append(object.script_for(&CrudAction::Create)?);
                }
                (CrudKind::Alter, ObjectState::Existing) if object.is_dirty() => {
                    script.append(object.script_for(&CrudAction::Alter)?);
                }
                _ => {}
            }
        }
        Ok(script)
    }

    fn script_for(&self, action: &CrudAction) -> SfcResult<Script> {
        let kind = action.kind();
        if !self.object_type().supports(kind) {
            return Err(SfcError::NotScriptable {
                type_name: self.type_name().to_string(),
                action: kind,
            });
        }
        self.object_type().script(action, self)
    }

    fn post_crud(self: &Arc<Self>, domain: &Domain, action: &CrudAction, old_urn: Urn) -> SfcResult<()> {
        match action {
            CrudAction::Create => {
                let collection = self.parent_collection()?;
                if collection.get_existing(&self.key()).is_none() {
                    collection.add(self.clone())?;
                }
            }
            CrudAction::Alter => {}
            CrudAction::Drop => {
                if let Ok(collection) = self.parent_collection() {
                    collection.remove_element(self);
                }
            }
            CrudAction::Rename { new_key } => {
                let new_urn = old_urn
                    .parent()
                    .map(|p| p.child(new_key.urn_segment()))
                    .unwrap_or_else(|| Urn::from_segments(vec![new_key.urn_segment()]));
                domain.publish(ObjectEvent::new(EventKind::BeforeRenamed, self).with_related(new_urn));
                self.parent_collection()?.rename(self, new_key.clone())?;
                domain.publish(ObjectEvent::new(EventKind::AfterRenamed, self).with_related(old_urn));
            }
            CrudAction::Move { new_parent } => {
                let new_urn = new_parent.urn().child(self.key().urn_segment());
                domain.publish(ObjectEvent::new(EventKind::BeforeMoved, self).with_related(new_urn));
                self.parent_collection()?.remove_element(self);
                self.key_chain().set_parent(new_parent.key_chain().clone())?;
                self.set_parent(Arc::downgrade(new_parent));
                new_parent.child_collection(self.type_name())?.add(self.clone())?;
                domain.publish(ObjectEvent::new(EventKind::AfterMoved, self).with_related(old_urn));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;
    use crate::domain::DomainDefinition;
    use crate::events::EventFilter;
    use crate::metadata::TypeMetadata;
    use crate::object_type::ObjectType;
    use crate::properties::PropertyValues;
    use crate::testing::*;
    use sfc_types::Value;

    fn get(domain: &Domain, urn: &Urn) -> Arc<Instance> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        domain.get_object(urn).unwrap().unwrap()
    }

    fn new_table(parent: &Arc<Instance>, schema: &str, name: &str) -> Arc<Instance> {
        parent
            .child_collection("Table")
            .unwrap()
            .factory()
            .create_populated(
                parent,
                &PropertyValues::new().with("Schema", schema).with("Name", name),
                ObjectState::Pending,
            )
            .unwrap()
    }

    fn kinds(stream: &mut crate::events::EventStream) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(event) = stream.try_recv() {
            out.push(event.kind);
        }
        out
    }

    // ---- Test 1: create writes the object and joins the parent collection ----
    #[test]
    fn create_online() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let mut events = domain.events().subscribe(EventFilter::default());
        let sales = get(&domain, &database_urn("sales"));

        let invoices = new_table(&sales, "dbo", "invoices");
        invoices.set_property("Description", "billing").unwrap();
        invoices.create().unwrap();

        let urn = table_urn("sales", "dbo", "invoices");
        assert!(store.contains(&urn));
        assert_eq!(store.property(&urn, "Description"), Some(Value::from("billing")));
        assert_eq!(invoices.state(), ObjectState::Existing);
        assert!(!invoices.is_dirty());

        let tables = sales.child_collection("Table").unwrap();
        assert_eq!(tables.count().unwrap(), 4);
        assert!(Arc::ptr_eq(
            &tables.get_existing(&invoices.key()).unwrap(),
            &invoices
        ));
        assert_eq!(kinds(&mut events), vec![EventKind::Created]);
    }

    #[test]
    fn create_checks_state_and_required_properties() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let orders = get(&domain, &table_urn("sales", "dbo", "orders"));
        assert!(matches!(orders.create(), Err(SfcError::InvalidState { .. })));

        let column = orders
            .child_collection("Column")
            .unwrap()
            .factory()
            .create_populated(&orders, &PropertyValues::new().with("Name", "note"), ObjectState::Pending)
            .unwrap();
        assert!(matches!(
            column.create(),
            Err(SfcError::MissingRequiredProperties { .. })
        ));
        column.set_property("DataType", "text").unwrap();
        column.create().unwrap();
        assert!(store.contains(&column_urn("sales", "dbo", "orders", "note")));
    }

    #[test]
    fn offline_create_rejects_duplicates() {
        let domain = offline_catalog();
        let root = domain.root();
        let factory = domain.factory("Database").unwrap();
        let first = factory
            .create_populated(root, &PropertyValues::new().with("Name", "a"), ObjectState::Pending)
            .unwrap();
        first.create().unwrap();
        assert_eq!(first.state(), ObjectState::Existing);
        assert_eq!(root.child_collection("Database").unwrap().loaded_items().len(), 1);

        let second = factory
            .create_populated(root, &PropertyValues::new().with("Name", "a"), ObjectState::Pending)
            .unwrap();
        assert!(matches!(
            second.create(),
            Err(SfcError::CrudFailed { operation: CrudKind::Create, .. })
        ));
        assert_eq!(second.state(), ObjectState::Pending);
    }

    // ---- Test 2: alter writes dirty values only ----
    #[test]
    fn alter_writes_dirty_properties() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let mut events = domain.events().subscribe(EventFilter {
            kinds: Some(vec![EventKind::Altered]),
            ..Default::default()
        });
        let sales = get(&domain, &database_urn("sales"));
        sales.set_property("Owner", "erin").unwrap();
        sales.alter().unwrap();

        assert_eq!(
            store.property(&database_urn("sales"), "Owner"),
            Some(Value::from("erin"))
        );
        assert!(!sales.is_dirty());
        assert_eq!(kinds(&mut events), vec![EventKind::Altered]);
    }

    #[test]
    fn alter_applies_pending_children() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let sales = get(&domain, &database_urn("sales"));
        let tables = sales.child_collection("Table").unwrap();
        let orders = tables
            .get_object_by_key(&Key::schema_named("Table", "dbo", "orders").unwrap())
            .unwrap()
            .unwrap();
        orders.mark_for_drop(true).unwrap();
        let refunds = new_table(&sales, "dbo", "refunds");
        tables.add(refunds.clone()).unwrap();

        sales.alter().unwrap();

        assert!(!store.contains(&table_urn("sales", "dbo", "orders")));
        assert!(!store.contains(&column_urn("sales", "dbo", "orders", "id")));
        assert!(store.contains(&table_urn("sales", "dbo", "refunds")));
        assert_eq!(orders.state(), ObjectState::Dropped);
        assert!(tables.get_existing(&orders.key()).is_none());
        assert_eq!(refunds.state(), ObjectState::Existing);
        assert_eq!(tables.count().unwrap(), 3);
    }

    #[test]
    fn alter_recreates_replaced_children() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let sales = get(&domain, &database_urn("sales"));
        let tables = sales.child_collection("Table").unwrap();
        let key = Key::schema_named("Table", "dbo", "orders").unwrap();
        let old = tables.get_object_by_key(&key).unwrap().unwrap();
        tables.remove(&old).unwrap();
        let replacement = new_table(&sales, "dbo", "orders");
        tables.add(replacement.clone()).unwrap();
        assert_eq!(replacement.state(), ObjectState::Recreate);

        sales.alter().unwrap();

        let urn = table_urn("sales", "dbo", "orders");
        assert!(store.contains(&urn));
        assert_eq!(store.property(&urn, "RowCount"), None);
        assert!(!store.contains(&column_urn("sales", "dbo", "orders", "id")));
        assert_eq!(replacement.state(), ObjectState::Existing);
        assert_eq!(old.state(), ObjectState::Dropped);
    }

    // ---- Test 3: drop removes the subtree ----
    #[test]
    fn drop_removes_subtree() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let mut events = domain.events().subscribe(EventFilter {
            kinds: Some(vec![EventKind::Dropped]),
            ..Default::default()
        });
        let sales = get(&domain, &database_urn("sales"));
        let tables = sales.child_collection("Table").unwrap().items().unwrap();
        let before = store.stats().scripts_executed;

        sales.drop().unwrap();

        assert_eq!(store.stats().scripts_executed, before + 1);
        assert!(!store.contains(&database_urn("sales")));
        assert!(!store.contains(&table_urn("sales", "dbo", "orders")));
        assert_eq!(sales.state(), ObjectState::Dropped);
        assert!(tables.iter().all(|t| t.state() == ObjectState::Dropped));
        let databases = domain.root().child_collection("Database").unwrap();
        assert!(databases.get_existing(&sales.key()).is_none());
        assert_eq!(kinds(&mut events).len(), 1 + tables.len());
    }

    // ---- Test 4: rename moves the store row and every descendant URN ----
    #[test]
    fn rename_updates_store_and_descendants() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let mut events = domain.events().subscribe(EventFilter::default());
        let orders = get(&domain, &table_urn("sales", "dbo", "orders"));
        let id = orders
            .child_collection("Column")
            .unwrap()
            .get_object_by_key(&Key::named("Column", "id").unwrap())
            .unwrap()
            .unwrap();

        orders
            .rename(Key::schema_named("Table", "dbo", "purchases").unwrap())
            .unwrap();

        assert!(store.contains(&table_urn("sales", "dbo", "purchases")));
        assert!(store.contains(&column_urn("sales", "dbo", "purchases", "id")));
        assert!(!store.contains(&table_urn("sales", "dbo", "orders")));
        assert_eq!(orders.urn(), table_urn("sales", "dbo", "purchases"));
        assert_eq!(id.urn(), column_urn("sales", "dbo", "purchases", "id"));
        assert_eq!(orders.property("Name").unwrap(), Value::from("purchases"));

        let received: Vec<ObjectEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].kind, EventKind::BeforeRenamed);
        assert_eq!(received[0].urn, table_urn("sales", "dbo", "orders"));
        assert_eq!(received[0].related_urn, Some(table_urn("sales", "dbo", "purchases")));
        assert_eq!(received[1].kind, EventKind::AfterRenamed);
        assert_eq!(received[1].related_urn, Some(table_urn("sales", "dbo", "orders")));
    }

    #[test]
    fn rename_onto_sibling_fails() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let orders = get(&domain, &table_urn("sales", "dbo", "orders"));
        let err = orders
            .rename(Key::schema_named("Table", "dbo", "customers").unwrap())
            .unwrap_err();
        assert!(matches!(err, SfcError::InvalidRename(_)));
        assert_eq!(orders.urn(), table_urn("sales", "dbo", "orders"));
        assert!(store.contains(&table_urn("sales", "dbo", "orders")));
    }

    // ---- Test 5: move re-parents the chain ----
    #[test]
    fn move_reparents_subtree() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let orders = get(&domain, &table_urn("sales", "dbo", "orders"));
        let id = get(&domain, &column_urn("sales", "dbo", "orders", "id"));
        let hr = get(&domain, &database_urn("hr"));
        let sales = orders.parent().unwrap();

        orders.move_to(&hr).unwrap();

        assert!(store.contains(&table_urn("hr", "dbo", "orders")));
        assert!(store.contains(&column_urn("hr", "dbo", "orders", "id")));
        assert_eq!(id.urn(), column_urn("hr", "dbo", "orders", "id"));
        assert!(Arc::ptr_eq(&orders.parent().unwrap(), &hr));
        assert!(sales
            .child_collection("Table")
            .unwrap()
            .get_existing(&orders.key())
            .is_none());
        assert!(hr.child_collection("Table").unwrap().get_existing(&orders.key()).is_some());

        assert!(matches!(orders.move_to(&hr), Err(SfcError::InvalidMove(_))));
        assert!(matches!(
            orders.move_to(domain.root()),
            Err(SfcError::InvalidMove(_))
        ));
    }

    // ---- Test 6: batch modes defer execution until flush ----
    #[test]
    fn batch_mode_defers_until_flush() {
        let store = seeded_store();
        let domain = open_catalog_with(
            &store,
            DomainConfig::default().with_initial_mode(sfc_store::ConnectionMode::TransactedBatch),
        );
        let sales = get(&domain, &database_urn("sales"));
        sales.set_property("Owner", "frank").unwrap();
        sales.alter().unwrap();

        assert_eq!(sales.state(), ObjectState::Existing);
        assert_eq!(domain.connection_context().pending_scripts(), 1);
        assert_eq!(
            store.property(&database_urn("sales"), "Owner"),
            Some(Value::from("alice"))
        );

        assert_eq!(domain.flush().unwrap(), 1);
        assert_eq!(
            store.property(&database_urn("sales"), "Owner"),
            Some(Value::from("frank"))
        );
    }

    #[test]
    fn failed_execution_leaves_object_untouched() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let sales = get(&domain, &database_urn("sales"));
        sales.set_property("Owner", "gina").unwrap();
        store.fail_next_execution();

        let err = sales.alter().unwrap_err();
        assert!(matches!(err, SfcError::CrudFailed { operation: CrudKind::Alter, .. }));
        assert!(sales.is_dirty());
        assert_eq!(sales.state(), ObjectState::Existing);
    }

    #[test]
    fn mark_for_drop_rules() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let hr = get(&domain, &database_urn("hr"));
        hr.mark_for_drop(true).unwrap();
        assert_eq!(hr.state(), ObjectState::ToBeDropped);
        hr.mark_for_drop(false).unwrap();
        assert_eq!(hr.state(), ObjectState::Existing);

        let fresh = new_table(&hr, "dbo", "t");
        assert!(matches!(
            fresh.mark_for_drop(true),
            Err(SfcError::InvalidState { .. })
        ));
    }

    #[test]
    fn refresh_rereads_properties() {
        let store = seeded_store();
        let domain = open_catalog(&store);
        let hr = get(&domain, &database_urn("hr"));
        assert_eq!(hr.property("Owner").unwrap(), Value::from("bob"));
        store.insert(database_urn("hr"), vec![("Owner".into(), Value::from("hank"))]);
        hr.refresh().unwrap();
        assert_eq!(hr.property("Owner").unwrap(), Value::from("hank"));
    }

    #[test]
    fn without_state_management_states_stay_put() {
        let domain = crate::domain::Domain::open(
            Arc::new(CatalogDomain::new()),
            ROOT_NAME,
            None,
            DomainConfig {
                state_management: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        let db = domain
            .factory("Database")
            .unwrap()
            .create_populated(domain.root(), &PropertyValues::new().with("Name", "x"), ObjectState::Pending)
            .unwrap();
        db.set_property("Owner", "ivy").unwrap();
        db.alter().unwrap();
        assert_eq!(db.state(), ObjectState::Pending);
        assert!(!db.is_dirty());
    }

    #[derive(Debug)]
    struct Undroppable(crate::object_type::MetadataType);

    impl ObjectType for Undroppable {
        fn metadata(&self) -> &Arc<TypeMetadata> {
            self.0.metadata()
        }

        fn supports(&self, action: CrudKind) -> bool {
            action != CrudKind::Drop
        }
    }

    struct LockedLogins(CatalogDomain);

    impl DomainDefinition for LockedLogins {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn root_type(&self) -> &str {
            self.0.root_type()
        }

        fn object_type(&self, type_name: &str) -> Option<Arc<dyn ObjectType>> {
            let inner = self.0.object_type(type_name)?;
            if type_name == "Login" {
                let metadata = TypeMetadata::clone(inner.metadata());
                return Some(Arc::new(Undroppable(crate::object_type::MetadataType::new(metadata))));
            }
            Some(inner)
        }
    }

    #[test]
    fn unsupported_actions_are_not_scriptable() {
        let store = seeded_store();
        let domain = crate::domain::Domain::open(
            Arc::new(LockedLogins(CatalogDomain::new())),
            ROOT_NAME,
            Some(store.connect()),
            DomainConfig::default(),
        )
        .unwrap();
        let sa = get(&domain, &login_urn("sa"));
        assert!(matches!(
            sa.drop(),
            Err(SfcError::NotScriptable { action: CrudKind::Drop, .. })
        ));
        assert!(store.contains(&login_urn("sa")));
    }
}
