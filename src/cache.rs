use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;

use crate::errors::{ObjSpeedError, Result};

/// How a cache lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Cached,
    Loaded,
}

/// Bounded least-recently-used cache of loaded models.
///
/// Values are handed out as `Arc`s so an evicted model stays alive until every
/// caller currently using it drops its handle. The cache is passed by reference
/// to whoever needs it; there is no process-wide instance.
pub struct ModelCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Arc<V>>>,
}

impl<K: Hash + Eq + Clone + std::fmt::Debug, V> ModelCache<K, V> {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ObjSpeedError::validation("cache_capacity", "must be at least 1"))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains(key)
    }

    /// Look up `key`, marking it as most recently used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert or replace `key`. Returns the least recently used entry when it had
    /// to be evicted to make room.
    pub fn insert(&self, key: K, value: V) -> (Arc<V>, Option<(K, Arc<V>)>) {
        let value = Arc::new(value);
        let mut entries = self.entries.lock();
        let evicted = entries
            .push(key.clone(), Arc::clone(&value))
            .filter(|(evicted_key, _)| *evicted_key != key);
        if let Some((evicted_key, _)) = &evicted {
            debug!("evicted {:?} from model cache", evicted_key);
        }
        (value, evicted)
    }

    /// Return the cached value for `key`, loading and inserting it on a miss.
    ///
    /// The cache stays locked while `load` runs so concurrent callers asking
    /// for the same model wait for one load instead of racing their own.
    /// A failed load leaves the cache unchanged.
    pub fn get_or_try_insert_with<F>(&self, key: K, load: F) -> Result<(Arc<V>, Lookup)>
    where
        F: FnOnce() -> Result<V>,
    {
        let mut entries = self.entries.lock();
        if let Some(value) = entries.get(&key) {
            return Ok((Arc::clone(value), Lookup::Cached));
        }

        let value = Arc::new(load()?);
        if let Some((evicted_key, _)) = entries.push(key, Arc::clone(&value)) {
            debug!("evicted {:?} from model cache", evicted_key);
        }
        Ok((value, Lookup::Loaded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ModelCache::<String, u32>::new(0).is_err());
    }

    #[test]
    fn test_insert_and_get() -> Result<()> {
        let cache = ModelCache::new(2)?;
        assert!(cache.is_empty());

        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()).as_deref(), Some(&1));
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), 2);
        Ok(())
    }

    #[test]
    fn test_least_recently_used_is_evicted() -> Result<()> {
        let cache = ModelCache::new(2)?;
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get(&"a").is_some());

        let (_, evicted) = cache.insert("c", 3);
        assert_eq!(evicted.map(|(k, v)| (k, *v)), Some(("b", 2)));
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        Ok(())
    }

    #[test]
    fn test_replacing_a_key_is_not_an_eviction() -> Result<()> {
        let cache = ModelCache::new(1)?;
        cache.insert("a", 1);
        let (_, evicted) = cache.insert("a", 2);
        assert!(evicted.is_none());
        assert_eq!(cache.get(&"a").as_deref(), Some(&2));
        Ok(())
    }

    #[test]
    fn test_get_or_try_insert_with() -> Result<()> {
        let cache = ModelCache::new(4)?;
        let mut loads = 0;

        let (value, lookup) = cache.get_or_try_insert_with("model", || {
            loads += 1;
            Ok(42)
        })?;
        assert_eq!((*value, lookup), (42, Lookup::Loaded));

        let (value, lookup) = cache.get_or_try_insert_with("model", || {
            loads += 1;
            Ok(0)
        })?;
        assert_eq!((*value, lookup), (42, Lookup::Cached));
        assert_eq!(loads, 1);
        Ok(())
    }

    #[test]
    fn test_failed_load_is_not_cached() -> Result<()> {
        let cache: ModelCache<&str, u32> = ModelCache::new(4)?;
        let result = cache.get_or_try_insert_with("broken", || {
            Err(ObjSpeedError::validation("model", "missing"))
        });
        assert!(result.is_err());
        assert!(!cache.contains(&"broken"));
        Ok(())
    }

    #[test]
    fn test_evicted_value_outlives_cache_entry() -> Result<()> {
        let cache = ModelCache::new(1)?;
        let (first, _) = cache.insert("a", vec![1, 2, 3]);
        cache.insert("b", vec![4]);

        assert!(!cache.contains(&"a"));
        assert_eq!(*first, vec![1, 2, 3]);
        Ok(())
    }
}
