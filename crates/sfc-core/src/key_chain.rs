//! Key chains: the linked identity keys from a domain root to an object.
//!
//! A chain level holds its leaf key and a shared pointer to the parent's chain.
//! Descendants share their ancestors' chain levels, so replacing a leaf
//! (rename) or a parent pointer (move) is seen by every descendant at once.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use sfc_types::{Key, Urn};

use crate::error::{SfcError, SfcResult};

pub struct KeyChain {
    leaf: RwLock<Key>,
    parent: RwLock<Option<Arc<KeyChain>>>,
}

impl KeyChain {
    /// The chain of a domain root. `key` must be a domain-root key.
    pub fn root(key: Key) -> SfcResult<Arc<Self>> {
        if !key.is_domain_root() {
            return Err(SfcError::InvalidKeyChain(format!(
                "root chain needs a domain root key, got {}",
                key.urn_fragment()
            )));
        }
        Ok(Arc::new(Self {
            leaf: RwLock::new(key),
            parent: RwLock::new(None),
        }))
    }

    /// A chain one level below `parent`. `key` must not be a domain-root key.
    pub fn child(parent: Arc<KeyChain>, key: Key) -> SfcResult<Arc<Self>> {
        if key.is_domain_root() {
            return Err(SfcError::InvalidKeyChain(format!(
                "domain root key {key} cannot have a parent"
            )));
        }
        Ok(Arc::new(Self {
            leaf: RwLock::new(key),
            parent: RwLock::new(Some(parent)),
        }))
    }

    pub fn leaf(&self) -> Key {
        self.leaf.read().expect("key chain lock poisoned").clone()
    }

    pub fn parent(&self) -> Option<Arc<KeyChain>> {
        self.parent.read().expect("key chain lock poisoned").clone()
    }

    /// Replace the leaf key. The replacement must keep the level's kind.
    pub(crate) fn set_leaf(&self, key: Key) -> SfcResult<()> {
        let mut leaf = self.leaf.write().expect("key chain lock poisoned");
        if leaf.is_domain_root() != key.is_domain_root() {
            return Err(SfcError::InvalidKeyChain(format!(
                "cannot replace {} with {}",
                leaf.urn_fragment(),
                key.urn_fragment()
            )));
        }
        *leaf = key;
        Ok(())
    }

    pub(crate) fn set_parent(&self, parent: Arc<KeyChain>) -> SfcResult<()> {
        let mut slot = self.parent.write().expect("key chain lock poisoned");
        if slot.is_none() {
            return Err(SfcError::InvalidKeyChain(
                "a root chain cannot be re-parented".into(),
            ));
        }
        *slot = Some(parent);
        Ok(())
    }

    /// Keys from the root down to this level.
    pub fn levels(&self) -> Vec<Key> {
        let mut keys = vec![self.leaf()];
        let mut next = self.parent();
        while let Some(chain) = next {
            keys.push(chain.leaf());
            next = chain.parent();
        }
        keys.reverse();
        keys
    }

    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut next = self.parent();
        while let Some(chain) = next {
            depth += 1;
            next = chain.parent();
        }
        depth
    }

    pub fn urn(&self) -> Urn {
        Urn::from_segments(self.levels().iter().map(Key::urn_segment).collect())
    }

    pub fn root_key(&self) -> Key {
        match self.parent() {
            Some(parent) => parent.root_key(),
            None => self.leaf(),
        }
    }

    /// Whether the top level is a domain root.
    pub fn is_rooted(&self) -> bool {
        self.root_key().is_domain_root()
    }

    /// Whether `self` is a proper ancestor of `other`, compared structurally.
    pub fn is_ancestor_of(&self, other: &KeyChain) -> bool {
        let mine = self.levels();
        let theirs = other.levels();
        mine.len() < theirs.len() && theirs[..mine.len()] == mine[..]
    }
}

impl PartialEq for KeyChain {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.levels() == other.levels()
    }
}

impl Eq for KeyChain {}

impl Hash for KeyChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self.levels().iter().fold(0u64, |acc, key| {
            let mut h = std::collections::hash_map::DefaultHasher::new();
            key.hash(&mut h);
            acc ^ h.finish()
        });
        state.write_u64(combined);
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyChain").field(&self.urn().to_string()).finish()
    }
}

impl fmt::Display for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Arc<KeyChain> {
        KeyChain::root(Key::domain_root("Catalog", "Catalog", "main").unwrap()).unwrap()
    }

    fn db(parent: &Arc<KeyChain>, name: &str) -> Arc<KeyChain> {
        KeyChain::child(parent.clone(), Key::named("Database", name).unwrap()).unwrap()
    }

    #[test]
    fn urn_walks_to_root() {
        let r = root();
        let d = db(&r, "sales");
        let t = KeyChain::child(d.clone(), Key::schema_named("Table", "dbo", "orders").unwrap())
            .unwrap();
        assert_eq!(
            t.urn().to_string(),
            "Catalog[@Name='main']/Database[@Name='sales']/Table[@Name='orders' and @Schema='dbo']"
        );
        assert_eq!(t.depth(), 3);
        assert!(t.is_rooted());
        assert_eq!(t.root_key(), r.leaf());
    }

    #[test]
    fn kind_mismatches_are_rejected() {
        assert!(KeyChain::root(Key::named("Catalog", "main").unwrap()).is_err());
        let r = root();
        assert!(KeyChain::child(r.clone(), Key::domain_root("X", "X", "x").unwrap()).is_err());
        assert!(r.set_leaf(Key::named("Catalog", "other").unwrap()).is_err());
        assert!(r.set_parent(root()).is_err());
    }

    #[test]
    fn rename_propagates_to_descendants() {
        let r = root();
        let d = db(&r, "sales");
        let t = KeyChain::child(d.clone(), Key::named("Table", "orders").unwrap()).unwrap();
        d.set_leaf(Key::named("Database", "revenue").unwrap()).unwrap();
        assert!(t.urn().to_string().contains("@Name='revenue'"));
    }

    #[test]
    fn move_propagates_to_descendants() {
        let r = root();
        let a = db(&r, "a");
        let b = db(&r, "b");
        let t = KeyChain::child(a.clone(), Key::named("Table", "t").unwrap()).unwrap();
        let c = KeyChain::child(t.clone(), Key::named("Column", "c").unwrap()).unwrap();
        t.set_parent(b.clone()).unwrap();
        assert!(b.is_ancestor_of(&c));
        assert!(!a.is_ancestor_of(&c));
        assert!(!c.is_ancestor_of(&c));
    }

    #[test]
    fn structural_equality_and_hash() {
        use std::collections::hash_map::DefaultHasher;

        fn hash_of(chain: &KeyChain) -> u64 {
            let mut h = DefaultHasher::new();
            chain.hash(&mut h);
            h.finish()
        }

        let r1 = root();
        let r2 = root();
        let a = db(&r1, "sales");
        let b = db(&r2, "sales");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, db(&r1, "hr"));
    }
}
