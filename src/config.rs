use crate::error::{FtlError, Result};
use crate::geometry::Geometry;

pub type BaseType = usize;

pub type Lpn = BaseType;
pub type Ppn = BaseType;
pub type BlockId = BaseType;
pub type Counter = BaseType;

pub const PAGE_SIZE: BaseType = 4096;
pub const PAGES_PER_BLOCK: BaseType = 64;
pub const BLOCKS: BaseType = 256;

/// GC starts once free blocks drop below this share of all blocks.
pub const LOW_WATER_MARK_RATIO: f64 = 0.05;
/// Percent of physical pages hidden from the host.
pub const OVER_PROVISIONING: f64 = 25.0;
pub const GC_PROGRESS_INTERVAL: Counter = 10;

pub const MAPPING_ENTRY_BYTES: BaseType = 8;

pub const CACHE_ENTRIES: Counter = 1024;
pub const PROTECTED_RATIO: f64 = 0.5;
pub const GROUP_NODE_BYTES: BaseType = 16;
pub const ENTRY_NODE_BYTES: BaseType = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Lru,
    Slru,
    TwoLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub policy: CachePolicy,
    /// Entry budget, used by `Lru` and `Slru`.
    pub max_entries: Counter,
    /// Byte budget, used by `TwoLevel`.
    pub max_bytes: BaseType,
    pub protected_ratio: f64,
    pub group_bytes: BaseType,
    pub entry_bytes: BaseType,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            policy: CachePolicy::Lru,
            max_entries: CACHE_ENTRIES,
            max_bytes: CACHE_ENTRIES * ENTRY_NODE_BYTES,
            protected_ratio: PROTECTED_RATIO,
            group_bytes: GROUP_NODE_BYTES,
            entry_bytes: ENTRY_NODE_BYTES,
        }
    }
}

impl CacheConfig {
    pub fn lru(max_entries: Counter) -> Self {
        CacheConfig {
            policy: CachePolicy::Lru,
            max_entries,
            ..Default::default()
        }
    }

    pub fn slru(max_entries: Counter, protected_ratio: f64) -> Self {
        CacheConfig {
            policy: CachePolicy::Slru,
            max_entries,
            protected_ratio,
            ..Default::default()
        }
    }

    pub fn two_level(max_bytes: BaseType) -> Self {
        CacheConfig {
            policy: CachePolicy::TwoLevel,
            max_bytes,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.policy {
            CachePolicy::Lru => {
                if self.max_entries == 0 {
                    return Err(FtlError::Config("cache needs at least one entry"));
                }
            }
            CachePolicy::Slru => {
                if self.max_entries == 0 {
                    return Err(FtlError::Config("cache needs at least one entry"));
                }
                if !(self.protected_ratio > 0.0 && self.protected_ratio < 1.0) {
                    return Err(FtlError::Config("protected ratio must be in (0, 1)"));
                }
            }
            CachePolicy::TwoLevel => {
                if self.entry_bytes == 0 {
                    return Err(FtlError::Config("entry node bytes must be non-zero"));
                }
                if self.max_bytes < self.group_bytes + self.entry_bytes {
                    return Err(FtlError::Config(
                        "byte budget cannot hold a single group and entry",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Immutable simulation settings, built once and handed to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub page_size: BaseType,
    pub pages_per_block: BaseType,
    pub num_blocks: BaseType,
    pub low_water_mark_ratio: f64,
    pub over_provisioning: f64,
    pub gc_progress_interval: Counter,
    pub mapping_entry_bytes: BaseType,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: PAGE_SIZE,
            pages_per_block: PAGES_PER_BLOCK,
            num_blocks: BLOCKS,
            low_water_mark_ratio: LOW_WATER_MARK_RATIO,
            over_provisioning: OVER_PROVISIONING,
            gc_progress_interval: GC_PROGRESS_INTERVAL,
            mapping_entry_bytes: MAPPING_ENTRY_BYTES,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn with_geometry(page_size: BaseType, pages_per_block: BaseType, num_blocks: BaseType) -> Self {
        Config {
            page_size,
            pages_per_block,
            num_blocks,
            ..Default::default()
        }
    }

    pub fn with_low_water_mark(mut self, ratio: f64) -> Self {
        self.low_water_mark_ratio = ratio;
        self
    }

    pub fn with_over_provisioning(mut self, op: f64) -> Self {
        self.over_provisioning = op;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_gc_progress_interval(mut self, interval: Counter) -> Self {
        self.gc_progress_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.pages_per_block == 0 || self.num_blocks == 0 {
            return Err(FtlError::Config("geometry must be non-zero"));
        }
        if !(self.low_water_mark_ratio > 0.0 && self.low_water_mark_ratio < 1.0) {
            return Err(FtlError::Config("low water mark ratio must be in (0, 1)"));
        }
        if self.low_water_mark() == 0 {
            return Err(FtlError::Config("low water mark rounds to zero blocks"));
        }
        if !(0.0..100.0).contains(&self.over_provisioning) {
            return Err(FtlError::Config("over provisioning must be in [0, 100)"));
        }
        if self.gc_progress_interval == 0 {
            return Err(FtlError::Config("gc progress interval must be non-zero"));
        }
        if self.mapping_entry_bytes == 0 || self.mapping_entry_bytes > self.page_size {
            return Err(FtlError::Config("mapping entry must fit in a page"));
        }
        if self.logical_pages() == 0 {
            return Err(FtlError::Config("no logical pages left after over provisioning"));
        }
        self.cache.validate()
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(
            self.page_size,
            self.pages_per_block,
            self.num_blocks,
            self.page_size / self.mapping_entry_bytes,
        )
    }

    pub fn total_pages(&self) -> Counter {
        self.pages_per_block * self.num_blocks
    }

    pub fn logical_pages(&self) -> Counter {
        let op_pages = (self.total_pages() as f64 * (self.over_provisioning / 100.)).trunc() as Counter;
        self.total_pages() - op_pages
    }

    pub fn max_lpn(&self) -> Lpn {
        self.logical_pages().saturating_sub(1)
    }

    pub fn low_water_mark(&self) -> Counter {
        (self.low_water_mark_ratio * self.num_blocks as f64) as Counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn over_provisioning_hides_pages() {
        let conf = Config::with_geometry(4096, 4, 10).with_over_provisioning(25.0);
        assert_eq!(conf.total_pages(), 40);
        assert_eq!(conf.logical_pages(), 30);
        assert_eq!(conf.max_lpn(), 29);
    }

    #[test]
    fn rejects_bad_protected_ratio() {
        for ratio in [0.0, 1.0, 1.5] {
            let conf = Config::default().with_cache(CacheConfig::slru(8, ratio));
            assert!(matches!(conf.validate(), Err(FtlError::Config(_))));
        }
    }

    #[test]
    fn rejects_tiny_byte_budget() {
        let conf = Config::default().with_cache(CacheConfig::two_level(GROUP_NODE_BYTES));
        assert!(conf.validate().is_err());
    }

    #[test]
    fn rejects_zero_low_water_mark() {
        let conf = Config::with_geometry(4096, 4, 4).with_low_water_mark(0.1);
        assert!(conf.validate().is_err());
    }
}
