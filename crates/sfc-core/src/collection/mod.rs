//! Child collections.
//!
//! A collection holds the children of one element type under one owner. It
//! fills itself from the backing store on first use and reconciles fresh rows
//! with loaded items through a shadow backing:
//!
//! - `prepare_merge` starts an empty shadow with the live backing's settings
//! - `add_shadow` stages each row's item (existing items are reused)
//! - `finish_merge` swaps the shadow in
//!
//! Local additions that the store has not seen yet are only kept if the
//! store reports them too; callers create them through CRUD afterwards.

mod backing;

pub use backing::{Backing, DictionaryBacking, ListBacking, SortedBacking};

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use sfc_store::ConnectionMode;
use sfc_types::{Key, ObjectState};
use tracing::{debug, info};

use crate::collation::{Collation, Locale};
use crate::error::{SfcError, SfcResult};
use crate::factory::ObjectFactory;
use crate::instance::Instance;
use crate::metadata::BackingKind;
use crate::object_type::ObjectType;

/// Object-safe view of a child collection, whatever its backing.
pub trait ChildCollection: Send + Sync {
    fn element_type(&self) -> &str;

    fn object_type(&self) -> Arc<dyn ObjectType>;

    fn factory(&self) -> ObjectFactory {
        ObjectFactory::new(self.object_type())
    }

    /// The owning instance, `None` once it has been released.
    fn parent(&self) -> Option<Arc<Instance>>;

    fn backing_kind(&self) -> BackingKind;

    fn is_initialized(&self) -> bool;

    /// Mark the collection as loaded (or not) without touching the store.
    fn set_initialized(&self, initialized: bool);

    /// Load from the backing store unless already loaded, loading, owned by
    /// an object the store does not hold, or offline.
    fn ensure_initialized(&self) -> SfcResult<()>;

    fn count(&self) -> SfcResult<usize>;

    /// Items in the backing's order.
    fn items(&self) -> SfcResult<Vec<Arc<Instance>>>;

    /// Items already loaded, without initializing.
    fn loaded_items(&self) -> Vec<Arc<Instance>>;

    /// Insert `item`. Does not initialize the collection.
    ///
    /// An existing item marked for drop under the same key is replaced; it
    /// becomes `Dropped` and `item` becomes `Recreate`.
    fn add(&self, item: Arc<Instance>) -> SfcResult<()>;

    /// Remove `item` through the state machine.
    ///
    /// `Existing` and `Recreate` items are marked for drop and stay in the
    /// collection; other states are dropped and removed outright. Returns
    /// `false` when the key is absent.
    fn remove(&self, item: &Arc<Instance>) -> SfcResult<bool>;

    /// Remove the entry for `item`'s key without any state change.
    fn remove_element(&self, item: &Arc<Instance>) -> bool;

    /// Re-key `item` under `new_key`. Fails unless `item` is a member.
    fn rename(&self, item: &Arc<Instance>, new_key: Key) -> SfcResult<()>;

    /// Lookup among loaded items only.
    fn get_existing(&self, key: &Key) -> Option<Arc<Instance>>;

    /// Lookup that initializes the collection and, on a miss, tries to load
    /// the single object from the store. Offline misses yield `None`.
    fn get_object_by_key(&self, key: &Key) -> SfcResult<Option<Arc<Instance>>>;

    /// Whether `item` itself is stored under its key and is not `Dropped`.
    /// Another instance that merely shares the key is not a member.
    fn contains(&self, item: &Arc<Instance>) -> SfcResult<bool>;

    fn contains_key(&self, key: &Key) -> SfcResult<bool>;

    fn prepare_merge(&self);

    fn add_shadow(&self, item: Arc<Instance>) -> SfcResult<()>;

    fn finish_merge(&self);

    /// Reload from the store, then optionally refresh every live item.
    fn refresh(&self, refresh_children: bool) -> SfcResult<()>;

    fn as_any(&self) -> &dyn Any;
}

/// A child collection over backing `B`.
pub struct Collection<B: Backing> {
    owner: Weak<Instance>,
    element_type: Arc<dyn ObjectType>,
    backing: RwLock<B>,
    shadow: Mutex<Option<B>>,
    initialized: AtomicBool,
    initializing: AtomicBool,
}

/// Build the collection for a declared backing strategy.
pub(crate) fn new_collection(
    kind: BackingKind,
    owner: Weak<Instance>,
    element_type: Arc<dyn ObjectType>,
    collation: Collation,
) -> Arc<dyn ChildCollection> {
    match kind {
        BackingKind::Sorted => Arc::new(Collection::new(
            owner,
            element_type,
            SortedBacking::new(collation),
        )),
        BackingKind::Dictionary => Arc::new(Collection::new(
            owner,
            element_type,
            DictionaryBacking::new(),
        )),
        BackingKind::List => Arc::new(Collection::new(owner, element_type, ListBacking::new())),
    }
}

/// Resets the `initializing` flag however initialization ends.
struct InitializingGuard<'a>(&'a AtomicBool);

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<B: Backing + 'static> Collection<B> {
    pub(crate) fn new(owner: Weak<Instance>, element_type: Arc<dyn ObjectType>, backing: B) -> Self {
        Self {
            owner,
            element_type,
            backing: RwLock::new(backing),
            shadow: Mutex::new(None),
            initialized: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
        }
    }

    fn owner(&self) -> SfcResult<Arc<Instance>> {
        self.owner
            .upgrade()
            .ok_or_else(|| SfcError::MissingParent(format!("collection of {}", self.element_type.type_name())))
    }

    fn name(&self) -> String {
        match self.owner.upgrade() {
            Some(owner) => format!("{}/{}", owner.urn(), self.element_type.type_name()),
            None => self.element_type.type_name().to_string(),
        }
    }

    /// Read guard over a backing whose pending reorder has been applied.
    fn read(&self) -> RwLockReadGuard<'_, B> {
        let needs = self
            .backing
            .read()
            .expect("collection lock poisoned")
            .needs_reorder();
        if needs {
            drop(self.write());
        }
        self.backing.read().expect("collection lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, B> {
        let mut backing = self.backing.write().expect("collection lock poisoned");
        backing.reorder();
        backing
    }

    /// Write guard without applying a pending reorder.
    fn write_raw(&self) -> RwLockWriteGuard<'_, B> {
        self.backing.write().expect("collection lock poisoned")
    }

    fn duplicate(&self, key: &Key) -> SfcError {
        SfcError::DuplicateKey {
            collection: self.name(),
            key: key.to_string(),
        }
    }

    fn check_parent(&self, item: &Arc<Instance>) -> SfcResult<()> {
        let owner = self.owner()?;
        let parented = item.parent().is_some_and(|p| Arc::ptr_eq(&p, &owner));
        if !parented || item.type_name() != self.element_type.type_name() {
            return Err(SfcError::InvalidParent(format!(
                "{} cannot be added to {}",
                item.urn(),
                self.name()
            )));
        }
        Ok(())
    }

    fn initialize_from_store(&self, owner: &Arc<Instance>, refresh: bool) -> SfcResult<()> {
        self.initializing.store(true, Ordering::SeqCst);
        let _guard = InitializingGuard(&self.initializing);

        if owner.key_chain().is_rooted() {
            self.prepare_merge();
            if let Err(e) = owner.init_child_level(self) {
                self.shadow.lock().expect("collection lock poisoned").take();
                return Err(e);
            }
            self.finish_merge();
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(collection = %self.name(), count = self.read().len(), refresh, "collection initialized");
        Ok(())
    }

    /// Lazily create and initialize a single child the collection has not loaded.
    fn load_single(&self, key: &Key) -> SfcResult<Option<Arc<Instance>>> {
        if key.type_name() != self.element_type.type_name() {
            return Ok(None);
        }
        let owner = self.owner()?;
        if owner.domain()?.mode() == ConnectionMode::Offline {
            return Ok(None);
        }
        let child = self
            .factory()
            .create_lazy(&owner, key.clone(), ObjectState::Existing)?;
        match child.initialize() {
            Ok(()) => {}
            Err(SfcError::ObjectInitialization { urn }) => {
                debug!(%urn, "no such object in the backing store");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        self.write()
            .insert(key.clone(), child.clone())
            .map_err(|_| self.duplicate(key))?;
        Ok(Some(child))
    }

    /// Lookup that initializes on demand. Same as
    /// [`ChildCollection::get_object_by_key`].
    pub fn get(&self, key: &Key) -> SfcResult<Option<Arc<Instance>>> {
        self.get_object_by_key(key)
    }
}

impl Collection<SortedBacking> {
    pub fn collation(&self) -> Collation {
        self.read().collation().clone()
    }

    /// Replace the collation. Items are re-ordered on the next read.
    ///
    /// Fails with [`SfcError::DuplicateKey`] when two loaded keys would be
    /// equal under `collation`; the collection keeps its current order.
    pub fn set_collation(&self, collation: Collation) -> SfcResult<()> {
        let changed = self.write_raw().set_collation(collation);
        changed.map_err(|key| self.duplicate(&key))
    }

    pub fn set_ignore_case(&self, ignore_case: bool) -> SfcResult<()> {
        let next = self.collation().with_ignore_case(ignore_case);
        self.set_collation(next)
    }

    pub fn set_ascending(&self, ascending: bool) -> SfcResult<()> {
        let next = self.collation().with_ascending(ascending);
        self.set_collation(next)
    }

    pub fn set_culture(&self, culture: &str) -> SfcResult<()> {
        let current = self.collation();
        let next = Collation::new(Locale::parse(culture)?)
            .with_ignore_case(current.ignore_case())
            .with_ascending(current.ascending());
        self.set_collation(next)
    }
}

impl<B: Backing + 'static> ChildCollection for Collection<B> {
    fn element_type(&self) -> &str {
        self.element_type.type_name()
    }

    fn object_type(&self) -> Arc<dyn ObjectType> {
        self.element_type.clone()
    }

    fn parent(&self) -> Option<Arc<Instance>> {
        self.owner.upgrade()
    }

    fn backing_kind(&self) -> BackingKind {
        self.read().kind()
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    fn ensure_initialized(&self) -> SfcResult<()> {
        if self.is_initialized() || self.initializing.load(Ordering::SeqCst) {
            return Ok(());
        }
        let owner = self.owner()?;
        let domain = owner.domain()?;
        if domain.uses_state_management() && !owner.state().is_live_in_store() {
            return Ok(());
        }
        if domain.mode() == ConnectionMode::Offline {
            return Ok(());
        }
        self.initialize_from_store(&owner, false)
    }

    fn count(&self) -> SfcResult<usize> {
        self.ensure_initialized()?;
        Ok(self.read().len())
    }

    fn items(&self) -> SfcResult<Vec<Arc<Instance>>> {
        self.ensure_initialized()?;
        Ok(self.read().values())
    }

    fn loaded_items(&self) -> Vec<Arc<Instance>> {
        self.read().values()
    }

    fn add(&self, item: Arc<Instance>) -> SfcResult<()> {
        self.check_parent(&item)?;
        let key = item.key();
        let mut backing = self.write();
        if let Some(existing) = backing.get(&key).cloned() {
            if existing.state() == ObjectState::ToBeDropped && !Arc::ptr_eq(&existing, &item) {
                backing.remove(&key);
                existing.set_state(ObjectState::Dropped);
                item.set_state(ObjectState::Recreate);
                debug!(urn = %item.urn(), "replacing object marked for drop");
            }
        }
        backing.insert(key.clone(), item).map_err(|_| self.duplicate(&key))
    }

    fn remove(&self, item: &Arc<Instance>) -> SfcResult<bool> {
        self.ensure_initialized()?;
        let key = item.key();
        let Some(found) = self.read().get(&key).cloned() else {
            return Ok(false);
        };
        match found.state() {
            ObjectState::Dropped => return Ok(false),
            ObjectState::Existing | ObjectState::Recreate => {
                found.set_state(ObjectState::ToBeDropped);
            }
            ObjectState::ToBeDropped => {}
            ObjectState::Pending => {
                found.set_state(ObjectState::Dropped);
                self.write().remove(&key);
            }
        }
        Ok(true)
    }

    fn remove_element(&self, item: &Arc<Instance>) -> bool {
        self.write().remove(&item.key()).is_some()
    }

    fn rename(&self, item: &Arc<Instance>, new_key: Key) -> SfcResult<()> {
        self.ensure_initialized()?;
        if !self.contains(item)? {
            return Err(SfcError::InvalidRename(format!(
                "{} is not in {}",
                item.urn(),
                self.name()
            )));
        }
        if new_key.type_name() != self.element_type.type_name() {
            return Err(SfcError::InvalidRename(format!(
                "key {} is not a {} key",
                new_key.urn_fragment(),
                self.element_type.type_name()
            )));
        }
        if self.contains_key(&new_key)? {
            return Err(SfcError::InvalidRename(format!(
                "{} already exists in {}",
                new_key,
                self.name()
            )));
        }
        let metadata = self.element_type.metadata();
        let copied = new_key
            .fields()
            .iter()
            .filter(|(name, _)| metadata.get(name).is_some_and(|p| p.is_key()))
            .count();
        if copied == 0 {
            return Err(SfcError::InvalidRename(format!(
                "key {} carries no key properties of {}",
                new_key.urn_fragment(),
                metadata.type_name()
            )));
        }

        let old_key = item.key();
        let mut backing = self.write();
        if !backing.get(&old_key).is_some_and(|entry| Arc::ptr_eq(entry, item)) {
            return Err(SfcError::InvalidRename(format!("{} is not in {}", item.urn(), self.name())));
        }
        backing.remove(&old_key);
        if let Err(e) = item.rekey(new_key.clone()) {
            let _ = backing.insert(old_key, item.clone());
            return Err(e);
        }
        backing
            .insert(new_key.clone(), item.clone())
            .map_err(|_| self.duplicate(&new_key))
    }

    fn get_existing(&self, key: &Key) -> Option<Arc<Instance>> {
        self.read().get(key).cloned()
    }

    fn get_object_by_key(&self, key: &Key) -> SfcResult<Option<Arc<Instance>>> {
        self.ensure_initialized()?;
        if let Some(found) = self.get_existing(key) {
            return Ok(Some(found));
        }
        self.load_single(key)
    }

    fn contains(&self, item: &Arc<Instance>) -> SfcResult<bool> {
        self.ensure_initialized()?;
        Ok(item.state() != ObjectState::Dropped
            && self
                .get_existing(&item.key())
                .is_some_and(|found| Arc::ptr_eq(&found, item)))
    }

    fn contains_key(&self, key: &Key) -> SfcResult<bool> {
        self.ensure_initialized()?;
        Ok(self
            .get_existing(key)
            .is_some_and(|found| found.state() != ObjectState::Dropped))
    }

    fn prepare_merge(&self) {
        let shadow = self.read().empty_like();
        *self.shadow.lock().expect("collection lock poisoned") = Some(shadow);
    }

    fn add_shadow(&self, item: Arc<Instance>) -> SfcResult<()> {
        self.check_parent(&item)?;
        let mut shadow = self.shadow.lock().expect("collection lock poisoned");
        let Some(shadow) = shadow.as_mut() else {
            return Err(SfcError::MergeNotPrepared(self.name()));
        };
        let key = item.key();
        shadow.insert(key.clone(), item).map_err(|_| self.duplicate(&key))
    }

    fn finish_merge(&self) {
        let shadow = self.shadow.lock().expect("collection lock poisoned").take();
        if let Some(shadow) = shadow {
            *self.write_raw() = shadow;
        }
    }

    fn refresh(&self, refresh_children: bool) -> SfcResult<()> {
        let owner = self.owner()?;
        if owner.domain()?.mode() != ConnectionMode::Offline {
            self.initialize_from_store(&owner, true)?;
        }
        if refresh_children {
            for item in self.loaded_items() {
                if item.state().is_live_in_store() {
                    item.refresh()?;
                }
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
