use std::collections::HashMap;

use log::trace;

use super::list::{Arena, Idx, List};
use super::TranslationCache;
use crate::config::{BaseType, Counter, Lpn};
use crate::error::{FtlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Probationary,
    Protected,
}

#[derive(Debug)]
struct Node<V> {
    key: Lpn,
    value: V,
    segment: Segment,
}

/// Segmented LRU. Misses land in probationary, hits move to protected.
/// Protected is capped; overflow is demoted back to probationary one entry at a time.
#[derive(Debug)]
pub struct SlruCache<V> {
    arena: Arena<Node<V>>,
    probationary: List,
    protected: List,
    table: HashMap<Lpn, Idx>,
    max_entries: Counter,
    max_protected: Counter,
    entry_bytes: BaseType,
}

impl<V> SlruCache<V> {
    pub fn new(max_entries: Counter, protected_ratio: f64, entry_bytes: BaseType) -> Result<Self> {
        if max_entries == 0 {
            return Err(FtlError::Config("cache needs at least one entry"));
        }
        if !(protected_ratio > 0.0 && protected_ratio < 1.0) {
            return Err(FtlError::Config("protected ratio must be in (0, 1)"));
        }
        let max_protected = ((max_entries as f64 * protected_ratio) as Counter).max(1);
        Ok(SlruCache {
            arena: Arena::new(),
            probationary: List::new(),
            protected: List::new(),
            table: HashMap::with_capacity(max_entries),
            max_entries,
            max_protected,
            entry_bytes,
        })
    }

    pub fn max_protected(&self) -> Counter {
        self.max_protected
    }

    pub fn protected_len(&self) -> Counter {
        self.protected.len()
    }

    pub fn probationary_len(&self) -> Counter {
        self.probationary.len()
    }

    pub fn segment_of(&self, key: Lpn) -> Option<Segment> {
        let idx = *self.table.get(&key)?;
        Some(self.arena.get(idx).segment)
    }

    fn hit(&mut self, idx: Idx) {
        match self.arena.get(idx).segment {
            Segment::Probationary => self.promote(idx),
            Segment::Protected => self.protected.move_to_front(&mut self.arena, idx),
        }
    }

    /// The only way into protected.
    fn promote(&mut self, idx: Idx) {
        if self.protected.len() >= self.max_protected {
            if let Some(tail) = self.protected.tail() {
                self.demote(tail);
            }
        }
        self.probationary.unlink(&mut self.arena, idx);
        self.protected.push_front(&mut self.arena, idx);
        self.arena.get_mut(idx).segment = Segment::Protected;
    }

    fn demote(&mut self, idx: Idx) {
        trace!("slru demote {}", self.arena.get(idx).key);
        self.protected.unlink(&mut self.arena, idx);
        self.probationary.push_front(&mut self.arena, idx);
        self.arena.get_mut(idx).segment = Segment::Probationary;
    }
}

impl<V> TranslationCache<V> for SlruCache<V> {
    fn get(&mut self, key: Lpn) -> Option<&V> {
        let idx = *self.table.get(&key)?;
        self.hit(idx);
        Some(&self.arena.get(idx).value)
    }

    fn peek(&self, key: Lpn) -> Option<&V> {
        let idx = *self.table.get(&key)?;
        Some(&self.arena.get(idx).value)
    }

    fn put(&mut self, key: Lpn, value: V) -> Vec<(Lpn, V)> {
        if let Some(&idx) = self.table.get(&key) {
            self.arena.get_mut(idx).value = value;
            self.hit(idx);
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while self.table.len() >= self.max_entries {
            match self.pop_victim() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        let idx = self.arena.insert(Node {
            key,
            value,
            segment: Segment::Probationary,
        });
        self.probationary.push_front(&mut self.arena, idx);
        self.table.insert(key, idx);
        evicted
    }

    fn remove(&mut self, key: Lpn) -> Option<V> {
        let idx = self.table.remove(&key)?;
        match self.arena.get(idx).segment {
            Segment::Probationary => self.probationary.unlink(&mut self.arena, idx),
            Segment::Protected => self.protected.unlink(&mut self.arena, idx),
        }
        Some(self.arena.remove(idx).value)
    }

    fn victim_key(&self) -> Option<Lpn> {
        self.probationary
            .tail()
            .or_else(|| self.protected.tail())
            .map(|idx| self.arena.get(idx).key)
    }

    fn len(&self) -> Counter {
        self.table.len()
    }

    fn bytes(&self) -> BaseType {
        self.table.len() * self.entry_bytes
    }

    fn is_full(&self) -> bool {
        self.table.len() >= self.max_entries
    }
}
