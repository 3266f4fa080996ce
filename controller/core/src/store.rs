use ahash::AHashMap as HashMap;
use parking_lot::RwLock;

/// A keyed store that may be shared between tasks.
///
/// Each operation takes the store's lock exactly once, so operations are atomic per call. Callers
/// that need to update more than one key must accept that readers can observe the intermediate
/// state.
#[derive(Debug)]
pub struct ObjectMapStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

// === impl ObjectMapStore ===

impl<V> Default for ObjectMapStore<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::default()),
        }
    }
}

impl<V: Clone> ObjectMapStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_update(&self, key: impl Into<String>, value: V) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn delete(&self, key: &str) -> Option<V> {
        self.entries.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Atomically reads and rewrites a single entry.
    ///
    /// The closure observes `None` when the key is absent. If it leaves `None` behind, the entry
    /// is removed.
    pub fn modify<R>(&self, key: &str, f: impl FnOnce(&mut Option<V>) -> R) -> R {
        let mut entries = self.entries.write();
        let mut entry = entries.remove(key);
        let ret = f(&mut entry);
        if let Some(value) = entry {
            entries.insert(key.to_string(), value);
        }
        ret
    }

    /// Atomically visits every entry, dropping those for which `f` returns false.
    pub fn retain(&self, mut f: impl FnMut(&str, &mut V) -> bool) {
        self.entries.write().retain(|k, v| f(k, v));
    }
}
