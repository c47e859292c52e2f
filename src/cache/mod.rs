//! Bounded caches keyed by logical page number.
//!
//! All three policies share [`TranslationCache`]; the mapping manager picks
//! one at construction through [`build_cache`] and never looks at the
//! concrete type again.

mod list;
pub mod lru;
pub mod slru;
pub mod two_level;

pub use lru::LruCache;
pub use slru::{Segment, SlruCache};
pub use two_level::TwoLevelCache;

use crate::config::{BaseType, CachePolicy, Config, Counter, Lpn};
use crate::error::Result;

pub trait TranslationCache<V> {
    /// Look up and promote.
    fn get(&mut self, key: Lpn) -> Option<&V>;

    /// Look up without touching recency.
    fn peek(&self, key: Lpn) -> Option<&V>;

    /// Insert or update, promoting the key. Returns whatever had to be
    /// evicted to stay within capacity.
    fn put(&mut self, key: Lpn, value: V) -> Vec<(Lpn, V)>;

    fn remove(&mut self, key: Lpn) -> Option<V>;

    /// The key the policy would evict next. Nothing is evicted.
    fn victim_key(&self) -> Option<Lpn>;

    fn len(&self) -> Counter;

    /// Estimated memory footprint.
    fn bytes(&self) -> BaseType;

    /// True when the next insert of a new key would have to evict.
    fn is_full(&self) -> bool;

    /// Whether inserting `key` fits without evicting. Only differs from
    /// `!is_full()` when the cost of an entry depends on its key.
    fn has_room_for(&self, _key: Lpn) -> bool {
        !self.is_full()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, key: Lpn) -> bool {
        self.peek(key).is_some()
    }

    fn pop_victim(&mut self) -> Option<(Lpn, V)> {
        let key = self.victim_key()?;
        self.remove(key).map(|value| (key, value))
    }
}

pub fn build_cache<V: 'static>(conf: &Config) -> Result<Box<dyn TranslationCache<V>>> {
    let cc = &conf.cache;
    cc.validate()?;
    let cache: Box<dyn TranslationCache<V>> = match cc.policy {
        CachePolicy::Lru => Box::new(LruCache::new(cc.max_entries, cc.entry_bytes)?),
        CachePolicy::Slru => Box::new(SlruCache::new(cc.max_entries, cc.protected_ratio, cc.entry_bytes)?),
        CachePolicy::TwoLevel => Box::new(TwoLevelCache::new(
            cc.max_bytes,
            cc.group_bytes,
            cc.entry_bytes,
            conf.geometry().entries_per_translation_page,
        )?),
    };
    Ok(cache)
}
