use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared in-process cache with explicit invalidation. Clones share the same
/// entries.
#[derive(Debug)]
pub struct KeyedCache<K, V> {
    entries: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for KeyedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    /// Returns the value it replaced, if any.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.write().insert(key, value)
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a HashMap half-updated
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate() {
        let cache: KeyedCache<String, u32> = KeyedCache::new();
        assert_eq!(cache.get(&"a".to_string()), None);

        assert_eq!(cache.put("a".to_string(), 1), None);
        assert_eq!(cache.put("a".to_string(), 2), Some(1));
        assert_eq!(cache.get(&"a".to_string()), Some(2));

        assert!(cache.invalidate(&"a".to_string()));
        assert!(!cache.invalidate(&"a".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn clones_share_entries() {
        let cache: KeyedCache<&'static str, u32> = KeyedCache::new();
        let other = cache.clone();

        other.put("streak", 3);
        assert_eq!(cache.get(&"streak"), Some(3));

        cache.clear();
        assert_eq!(other.len(), 0);
    }
}
