use std::collections::HashMap;

use super::list::{Arena, Idx, List};
use super::TranslationCache;
use crate::config::{BaseType, Counter, Lpn};
use crate::error::{FtlError, Result};

/// Plain LRU: hash index plus a recency list, head is most recent.
#[derive(Debug)]
pub struct LruCache<V> {
    arena: Arena<(Lpn, V)>,
    list: List,
    table: HashMap<Lpn, Idx>,
    capacity: Counter,
    entry_bytes: BaseType,
}

impl<V> LruCache<V> {
    pub fn new(capacity: Counter, entry_bytes: BaseType) -> Result<Self> {
        if capacity == 0 {
            return Err(FtlError::Config("cache needs at least one entry"));
        }
        Ok(LruCache {
            arena: Arena::new(),
            list: List::new(),
            table: HashMap::with_capacity(capacity),
            capacity,
            entry_bytes,
        })
    }

    /// Least to most recent.
    pub fn keys_lru_order(&self) -> Vec<Lpn> {
        self.list.iter_rev(&self.arena).map(|i| self.arena.get(i).0).collect()
    }

    pub fn most_recent_key(&self) -> Option<Lpn> {
        self.list.head().map(|i| self.arena.get(i).0)
    }
}

impl<V> TranslationCache<V> for LruCache<V> {
    fn get(&mut self, key: Lpn) -> Option<&V> {
        let idx = *self.table.get(&key)?;
        self.list.move_to_front(&mut self.arena, idx);
        Some(&self.arena.get(idx).1)
    }

    fn peek(&self, key: Lpn) -> Option<&V> {
        let idx = *self.table.get(&key)?;
        Some(&self.arena.get(idx).1)
    }

    fn put(&mut self, key: Lpn, value: V) -> Vec<(Lpn, V)> {
        if let Some(&idx) = self.table.get(&key) {
            self.arena.get_mut(idx).1 = value;
            self.list.move_to_front(&mut self.arena, idx);
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while self.table.len() >= self.capacity {
            match self.pop_victim() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        let idx = self.arena.insert((key, value));
        self.list.push_front(&mut self.arena, idx);
        self.table.insert(key, idx);
        evicted
    }

    fn remove(&mut self, key: Lpn) -> Option<V> {
        let idx = self.table.remove(&key)?;
        self.list.unlink(&mut self.arena, idx);
        Some(self.arena.remove(idx).1)
    }

    fn victim_key(&self) -> Option<Lpn> {
        self.list.tail().map(|i| self.arena.get(i).0)
    }

    fn len(&self) -> Counter {
        self.table.len()
    }

    fn bytes(&self) -> BaseType {
        self.table.len() * self.entry_bytes
    }

    fn is_full(&self) -> bool {
        self.table.len() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_promotes() {
        let mut c = LruCache::new(8, 8).unwrap();
        c.put(1, 10);
        c.put(2, 20);
        c.put(3, 30);
        assert_eq!(c.get(2), Some(&20));
        assert_eq!(c.victim_key(), Some(1));
        assert_eq!(c.keys_lru_order(), vec![1, 3, 2]);
    }

    #[test]
    fn peek_does_not_promote() {
        let mut c = LruCache::new(8, 8).unwrap();
        c.put(1, 10);
        c.put(2, 20);
        assert_eq!(c.peek(1), Some(&10));
        assert_eq!(c.victim_key(), Some(1));
    }

    #[test]
    fn update_moves_to_head() {
        let mut c = LruCache::new(8, 8).unwrap();
        c.put(1, 10);
        c.put(2, 20);
        assert!(c.put(1, 11).is_empty());
        assert_eq!(c.most_recent_key(), Some(1));
        assert_eq!(c.peek(1), Some(&11));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn insert_past_capacity_evicts_tail() {
        let mut c = LruCache::new(3, 8).unwrap();
        c.put(1, 10);
        c.put(2, 20);
        c.put(3, 30);
        c.get(1);
        assert!(c.is_full());
        assert_eq!(c.put(4, 40), vec![(2, 20)]);
        assert_eq!(c.len(), 3);
        assert_eq!(c.bytes(), 24);
        assert!(!c.contains(2));
    }

    #[test]
    fn remove_and_reuse() {
        let mut c = LruCache::new(2, 8).unwrap();
        c.put(1, 10);
        assert_eq!(c.remove(1), Some(10));
        assert_eq!(c.remove(1), None);
        assert_eq!(c.victim_key(), None);
        c.put(5, 50);
        assert_eq!(c.get(5), Some(&50));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(LruCache::<u32>::new(0, 8).is_err());
    }
}
