use std::collections::HashMap;

use super::list::{Arena, Idx, List};
use super::TranslationCache;
use crate::config::{BaseType, Counter, Lpn};
use crate::error::{FtlError, Result};

#[derive(Debug)]
struct EntryNode<V> {
    key: Lpn,
    value: V,
    hits: Counter,
    group: Idx,
}

#[derive(Debug)]
struct GroupNode {
    group_key: BaseType,
    entries: List,
    /// Sum of the hits of the entries currently in the group.
    hotness: Counter,
}

/// Two-level cache: entries grouped by translation page, groups ordered by hotness.
///
/// ```text
/// group list (hottest .. coldest)
///   group{key, hotness} -> group{key, hotness} -> ...
///       |                      |
///     entry (most recent)    entry
///       |                      |
///     entry (least recent)   entry   <- victim is here, in the coldest group
/// ```
///
/// A hit only bubbles its group past neighbours that are strictly colder or
/// hotter, so the group list is never globally re-sorted.
#[derive(Debug)]
pub struct TwoLevelCache<V> {
    groups: Arena<GroupNode>,
    group_list: List,
    group_table: HashMap<BaseType, Idx>,
    entries: Arena<EntryNode<V>>,
    entry_table: HashMap<Lpn, Idx>,
    entries_per_group: BaseType,
    max_bytes: BaseType,
    group_bytes: BaseType,
    entry_bytes: BaseType,
}

impl<V> TwoLevelCache<V> {
    pub fn new(
        max_bytes: BaseType,
        group_bytes: BaseType,
        entry_bytes: BaseType,
        entries_per_group: BaseType,
    ) -> Result<Self> {
        if entries_per_group == 0 || entry_bytes == 0 {
            return Err(FtlError::Config("group and entry sizes must be non-zero"));
        }
        if max_bytes < group_bytes + entry_bytes {
            return Err(FtlError::Config("byte budget cannot hold a single group and entry"));
        }
        Ok(TwoLevelCache {
            groups: Arena::new(),
            group_list: List::new(),
            group_table: HashMap::new(),
            entries: Arena::new(),
            entry_table: HashMap::new(),
            entries_per_group,
            max_bytes,
            group_bytes,
            entry_bytes,
        })
    }

    pub fn group_key_of(&self, key: Lpn) -> BaseType {
        key / self.entries_per_group
    }

    pub fn group_count(&self) -> Counter {
        self.group_table.len()
    }

    pub fn group_hotness(&self, group_key: BaseType) -> Option<Counter> {
        let g = *self.group_table.get(&group_key)?;
        Some(self.groups.get(g).hotness)
    }

    /// (group key, hotness), hottest first.
    pub fn groups_by_hotness(&self) -> Vec<(BaseType, Counter)> {
        self.group_list
            .iter(&self.groups)
            .map(|g| {
                let node = self.groups.get(g);
                (node.group_key, node.hotness)
            })
            .collect()
    }

    /// Extra bytes needed to insert `key` as a new entry.
    fn insert_cost(&self, key: Lpn) -> BaseType {
        if self.group_table.contains_key(&self.group_key_of(key)) {
            self.entry_bytes
        } else {
            self.group_bytes + self.entry_bytes
        }
    }

    fn hit(&mut self, e: Idx) {
        let g = self.entries.get(e).group;
        self.groups.get_mut(g).entries.move_to_front(&mut self.entries, e);
        self.entries.get_mut(e).hits += 1;
        self.groups.get_mut(g).hotness += 1;
        self.adjust_by_hotness(g);
    }

    /// Shift toward the head while hotter than prev, toward the tail while colder than next.
    fn adjust_by_hotness(&mut self, g: Idx) {
        let hotness = self.groups.get(g).hotness;
        while let Some(prev) = self.groups.prev(g) {
            if hotness <= self.groups.get(prev).hotness {
                break;
            }
            self.group_list.move_toward_head_by_one(&mut self.groups, g);
        }
        while let Some(next) = self.groups.next(g) {
            if hotness >= self.groups.get(next).hotness {
                break;
            }
            self.group_list.move_toward_tail_by_one(&mut self.groups, g);
        }
    }

    fn add_entry(&mut self, key: Lpn, value: V) -> Idx {
        let group_key = self.group_key_of(key);
        let g = match self.group_table.get(&group_key) {
            Some(&g) => g,
            None => {
                let g = self.groups.insert(GroupNode {
                    group_key,
                    entries: List::new(),
                    hotness: 0,
                });
                self.group_list.push_front(&mut self.groups, g);
                self.group_table.insert(group_key, g);
                g
            }
        };
        let e = self.entries.insert(EntryNode {
            key,
            value,
            hits: 0,
            group: g,
        });
        self.groups.get_mut(g).entries.push_front(&mut self.entries, e);
        self.entry_table.insert(key, e);
        e
    }
}

impl<V> TranslationCache<V> for TwoLevelCache<V> {
    fn get(&mut self, key: Lpn) -> Option<&V> {
        let e = *self.entry_table.get(&key)?;
        self.hit(e);
        Some(&self.entries.get(e).value)
    }

    fn peek(&self, key: Lpn) -> Option<&V> {
        let e = *self.entry_table.get(&key)?;
        Some(&self.entries.get(e).value)
    }

    fn put(&mut self, key: Lpn, value: V) -> Vec<(Lpn, V)> {
        if let Some(&e) = self.entry_table.get(&key) {
            self.entries.get_mut(e).value = value;
            self.hit(e);
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while self.bytes() + self.insert_cost(key) > self.max_bytes {
            match self.pop_victim() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        let e = self.add_entry(key, value);
        self.hit(e);
        evicted
    }

    fn remove(&mut self, key: Lpn) -> Option<V> {
        let e = self.entry_table.remove(&key)?;
        let g = self.entries.get(e).group;
        self.groups.get_mut(g).entries.unlink(&mut self.entries, e);
        let node = self.entries.remove(e);

        let group = self.groups.get_mut(g);
        group.hotness -= node.hits;
        if group.entries.is_empty() {
            let group_key = group.group_key;
            self.group_list.unlink(&mut self.groups, g);
            self.groups.remove(g);
            self.group_table.remove(&group_key);
        } else {
            self.adjust_by_hotness(g);
        }
        Some(node.value)
    }

    fn victim_key(&self) -> Option<Lpn> {
        let g = self.group_list.tail()?;
        let e = self.groups.get(g).entries.tail()?;
        Some(self.entries.get(e).key)
    }

    fn len(&self) -> Counter {
        self.entry_table.len()
    }

    fn bytes(&self) -> BaseType {
        self.group_table.len() * self.group_bytes + self.entry_table.len() * self.entry_bytes
    }

    fn is_full(&self) -> bool {
        self.bytes() + self.group_bytes + self.entry_bytes > self.max_bytes
    }

    fn has_room_for(&self, key: Lpn) -> bool {
        self.bytes() + self.insert_cost(key) <= self.max_bytes
    }
}
