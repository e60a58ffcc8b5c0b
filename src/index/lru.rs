//! Small LRU shard cache (spec §4.6 Phase 2, §5 memory budget).
//!
//! Capped at a small constant (default 50, spec §5) to avoid re-reading
//! shards from disk on every read in Phase 2's sequential scan and on
//! repeated `findDefinitions` calls. Built on `indexmap::IndexMap`, whose
//! insertion-order-preserving map is the standard way to get move-to-back
//! LRU behavior without pulling in a dedicated crate: `shift_remove` +
//! re-`insert` moves an entry to the most-recently-used end in O(n) on the
//! removed prefix, acceptable at this cache's small capacity.

use indexmap::IndexMap;

pub struct ShardLru<K, V> {
    capacity: usize,
    map: IndexMap<K, V>,
}

impl<K, V> ShardLru<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            map: IndexMap::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            let (k, v) = self.map.shift_remove_entry(key).expect("just checked");
            self.map.insert(k, v);
            self.map.get(key)
        } else {
            None
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        self.map.shift_remove(&key);
        if self.map.len() >= self.capacity {
            self.map.shift_remove_index(0);
        }
        self.map.insert(key, value);
    }

    pub fn invalidate(&mut self, key: &K) {
        self.map.shift_remove(key);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let mut cache: ShardLru<String, i32> = ShardLru::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.get(&"a".to_string());
        cache.put("c".to_string(), 3);
        assert!(cache.get(&"b".to_string()).is_none());
        assert!(cache.get(&"a".to_string()).is_some());
        assert!(cache.get(&"c".to_string()).is_some());
    }

    #[test]
    fn put_overwrites_existing_key() {
        let mut cache: ShardLru<String, i32> = ShardLru::new(2);
        cache.put("a".to_string(), 1);
        cache.put("a".to_string(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get(&"a".to_string()).unwrap(), 2);
    }
}
