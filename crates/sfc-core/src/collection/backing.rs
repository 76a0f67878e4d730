//! Storage strategies behind child collections.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sfc_types::Key;
use tracing::debug;

use crate::collation::Collation;
use crate::instance::Instance;
use crate::metadata::BackingKind;

/// Key-to-instance storage of one collection.
pub trait Backing: Send + Sync {
    fn kind(&self) -> BackingKind;

    /// An empty backing with the same settings, used as a merge shadow.
    fn empty_like(&self) -> Self
    where
        Self: Sized;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &Key) -> Option<&Arc<Instance>>;

    /// Insert under `key`. An occupied key hands the item back.
    fn insert(&mut self, key: Key, item: Arc<Instance>) -> Result<(), Arc<Instance>>;

    fn remove(&mut self, key: &Key) -> Option<Arc<Instance>>;

    /// Items in iteration order.
    fn values(&self) -> Vec<Arc<Instance>>;

    /// Whether [`Backing::reorder`] has pending work.
    fn needs_reorder(&self) -> bool {
        false
    }

    fn reorder(&mut self) {}
}

// ---------------------------------------------------------------------------
// Sorted
// ---------------------------------------------------------------------------

/// Map key ordered by a collation over the key's field values.
///
/// Fields compare one by one in key order; a key that runs out of fields
/// first sorts first. Two keys are the same map entry when every field is
/// equal under the collation.
struct CollatedKey {
    key: Key,
    collation: Arc<Collation>,
}

impl CollatedKey {
    fn new(key: &Key, collation: &Arc<Collation>) -> Self {
        Self {
            key: key.clone(),
            collation: collation.clone(),
        }
    }
}

impl PartialEq for CollatedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CollatedKey {}

impl PartialOrd for CollatedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollatedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let (mine, theirs) = (self.key.fields(), other.key.fields());
        let by_field = mine
            .iter()
            .zip(theirs)
            .map(|((_, a), (_, b))| self.collation.compare(a, b))
            .find(|o| *o != Ordering::Equal);
        match by_field {
            Some(ordering) => ordering,
            None if self.collation.ascending() => mine.len().cmp(&theirs.len()),
            None => theirs.len().cmp(&mine.len()),
        }
    }
}

/// Ordered by collation. Collation changes take effect on the next read.
pub struct SortedBacking {
    /// Collation the map is currently ordered by.
    active: Arc<Collation>,
    /// Collation requested by the owner.
    requested: Arc<Collation>,
    map: BTreeMap<CollatedKey, Arc<Instance>>,
}

impl SortedBacking {
    pub fn new(collation: Collation) -> Self {
        let collation = Arc::new(collation);
        Self {
            active: collation.clone(),
            requested: collation,
            map: BTreeMap::new(),
        }
    }

    pub fn collation(&self) -> &Collation {
        &self.requested
    }

    /// Request `collation` for the next read.
    ///
    /// Refused when two stored keys would be equal under it; the error
    /// carries one of them and the backing is left untouched.
    pub fn set_collation(&mut self, collation: Collation) -> Result<(), Key> {
        let next = Arc::new(collation);
        let mut rekeyed: Vec<CollatedKey> = self
            .map
            .keys()
            .map(|entry| CollatedKey::new(&entry.key, &next))
            .collect();
        rekeyed.sort();
        if let Some(pair) = rekeyed.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(pair[1].key.clone());
        }
        self.requested = next;
        Ok(())
    }
}

impl Backing for SortedBacking {
    fn kind(&self) -> BackingKind {
        BackingKind::Sorted
    }

    fn empty_like(&self) -> Self {
        Self {
            active: self.requested.clone(),
            requested: self.requested.clone(),
            map: BTreeMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn get(&self, key: &Key) -> Option<&Arc<Instance>> {
        self.map.get(&CollatedKey::new(key, &self.active))
    }

    fn insert(&mut self, key: Key, item: Arc<Instance>) -> Result<(), Arc<Instance>> {
        let entry = CollatedKey::new(&key, &self.active);
        if self.map.contains_key(&entry) {
            return Err(item);
        }
        self.map.insert(entry, item);
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Option<Arc<Instance>> {
        self.map.remove(&CollatedKey::new(key, &self.active))
    }

    fn values(&self) -> Vec<Arc<Instance>> {
        self.map.values().cloned().collect()
    }

    fn needs_reorder(&self) -> bool {
        !Arc::ptr_eq(&self.active, &self.requested)
    }

    /// Rebuild under the requested collation. `set_collation` has already
    /// ruled out collisions.
    fn reorder(&mut self) {
        if !self.needs_reorder() {
            return;
        }
        self.active = self.requested.clone();
        let active = self.active.clone();
        self.map = std::mem::take(&mut self.map)
            .into_iter()
            .map(|(entry, item)| (CollatedKey::new(&entry.key, &active), item))
            .collect();
        debug!(count = self.map.len(), "sorted collection reordered");
    }
}

// ---------------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------------

/// Hashed by key, no defined order.
#[derive(Default)]
pub struct DictionaryBacking {
    map: HashMap<Key, Arc<Instance>>,
}

impl DictionaryBacking {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backing for DictionaryBacking {
    fn kind(&self) -> BackingKind {
        BackingKind::Dictionary
    }

    fn empty_like(&self) -> Self {
        Self::new()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn get(&self, key: &Key) -> Option<&Arc<Instance>> {
        self.map.get(key)
    }

    fn insert(&mut self, key: Key, item: Arc<Instance>) -> Result<(), Arc<Instance>> {
        if self.map.contains_key(&key) {
            return Err(item);
        }
        self.map.insert(key, item);
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Option<Arc<Instance>> {
        self.map.remove(key)
    }

    fn values(&self) -> Vec<Arc<Instance>> {
        self.map.values().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Insertion order with linear lookup.
#[derive(Default)]
pub struct ListBacking {
    items: Vec<(Key, Arc<Instance>)>,
}

impl ListBacking {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &Key) -> Option<usize> {
        self.items.iter().position(|(k, _)| k == key)
    }
}

impl Backing for ListBacking {
    fn kind(&self) -> BackingKind {
        BackingKind::List
    }

    fn empty_like(&self) -> Self {
        Self::new()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, key: &Key) -> Option<&Arc<Instance>> {
        self.position(key).map(|i| &self.items[i].1)
    }

    fn insert(&mut self, key: Key, item: Arc<Instance>) -> Result<(), Arc<Instance>> {
        if self.position(&key).is_some() {
            return Err(item);
        }
        self.items.push((key, item));
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Option<Arc<Instance>> {
        self.position(key).map(|i| self.items.remove(i).1)
    }

    fn values(&self) -> Vec<Arc<Instance>> {
        self.items.iter().map(|(_, item)| item.clone()).collect()
    }
}
