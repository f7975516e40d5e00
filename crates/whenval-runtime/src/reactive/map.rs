#![forbid(unsafe_code)]

//! Keyed observable container.
//!
//! Every read tracks one map-wide change counter, so any effective write
//! re-runs every reaction that read the map. Absent keys read as `None`.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashMap;

use super::observable::Observable;

/// A reactive hash map.
///
/// Cloning creates a new handle to the **same** entries.
pub struct ObservableMap<K, V> {
    entries: Rc<RefCell<AHashMap<K, V>>>,
    changes: Observable<u64>,
}

impl<K, V> Clone for ObservableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
            changes: self.changes.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap")
            .field("entries", &*self.entries.borrow())
            .field("version", &self.changes.version())
            .finish()
    }
}

impl<K: Eq + Hash + 'static, V: 'static> Default for ObservableMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + 'static, V: 'static> ObservableMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(AHashMap::new())),
            changes: Observable::new(0),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&AHashMap<K, V>) -> R) -> R {
        self.changes.with(|_| ());
        f(&self.entries.borrow())
    }

    fn bump(&self) {
        self.changes.update(|n| *n += 1);
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.read(|entries| entries.contains_key(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `key`, returning its value. Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.entries.borrow_mut().remove(key);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn clear(&self) {
        let had_entries = {
            let mut entries = self.entries.borrow_mut();
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        };
        if had_entries {
            self.bump();
        }
    }

    /// Number of effective writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.changes.version()
    }
}

impl<K: Eq + Hash + Clone + 'static, V: 'static> ObservableMap<K, V> {
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.read(|entries| entries.keys().cloned().collect())
    }
}

impl<K: Eq + Hash + 'static, V: Clone + 'static> ObservableMap<K, V> {
    /// Clone the value under `key`; `None` when absent.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.read(|entries| entries.get(key).cloned())
    }
}

impl<K: Eq + Hash + 'static, V: PartialEq + 'static> ObservableMap<K, V> {
    /// Insert or replace. Returns whether the map changed; writing an equal
    /// value is a no-op.
    pub fn insert(&self, key: K, value: V) -> bool {
        let changed = {
            let mut entries = self.entries.borrow_mut();
            if entries.get(&key) == Some(&value) {
                false
            } else {
                entries.insert(key, value);
                true
            }
        };
        if changed {
            self.bump();
        }
        changed
    }
}
