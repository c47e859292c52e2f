//! Flash translation layer simulator: page- and block-mapped FTLs over a
//! wear-aware block pool, a bounded mapping cache and a greedy garbage collector.

pub mod blkpool;
pub mod cache;
pub mod config;
pub mod error;
pub mod flash;
pub mod ftl;
pub mod gc;
pub mod geometry;
pub mod mapping;
pub mod oob;
pub mod recorder;

pub use blkpool::{BlockPool, BlockTag, Choice, WearStats};
pub use cache::{build_cache, TranslationCache};
pub use config::{CacheConfig, CachePolicy, Config};
pub use error::{FtlError, Result};
pub use flash::{Category, FlashDevice, SimFlash};
pub use ftl::{build_ftl, BlockMapFtl, Ftl, FtlKind, PageMapFtl};
pub use gc::{GarbageCollector, GcReport, GcStatus, Reclaim};
pub use geometry::Geometry;
pub use mapping::{GlobalMappingTable, MappingEntry, MappingManager};
pub use recorder::Recorder;
