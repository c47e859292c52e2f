use log::{debug, info};

use crate::config::{BlockId, Config, Counter};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcStatus {
    /// Free blocks reached 1.5x the low water mark.
    TargetReached,
    /// Nothing left worth reclaiming.
    NoVictim,
    /// Free count did not grow across a whole progress window.
    NoProgress,
}

impl GcStatus {
    pub fn gave_up(&self) -> bool {
        !matches!(self, GcStatus::TargetReached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    pub status: GcStatus,
    pub reclaimed: Counter,
}

/// What a mapping scheme exposes to the collector.
pub trait Reclaim {
    fn free_block_count(&self) -> Counter;

    /// Next block to clean, or `None` when no block qualifies.
    fn next_victim(&self) -> Option<BlockId>;

    /// Move the live pages off `block`, erase it and hand it back to the free pool.
    fn reclaim(&mut self, block: BlockId) -> Result<()>;
}

/// Greedy foreground collector. Runs to completion inside the write that triggered it.
#[derive(Debug, Clone, Copy)]
pub struct GarbageCollector {
    low_water_mark: Counter,
    progress_interval: Counter,
}

impl GarbageCollector {
    pub fn new(conf: &Config) -> Self {
        GarbageCollector {
            low_water_mark: conf.low_water_mark(),
            progress_interval: conf.gc_progress_interval.max(1),
        }
    }

    pub fn low_water_mark(&self) -> Counter {
        self.low_water_mark
    }

    pub fn target(&self) -> f64 {
        self.low_water_mark as f64 * 1.5
    }

    pub fn needed(&self, free_blocks: Counter) -> bool {
        free_blocks < self.low_water_mark
    }

    pub fn collect<T: Reclaim + ?Sized>(&self, host: &mut T) -> Result<GcReport> {
        debug!(
            "garbage collection starts with {} free blocks, target {}",
            host.free_block_count(),
            self.target()
        );

        let mut last_free = host.free_block_count();
        let mut reclaimed = 0;
        let status = loop {
            if host.free_block_count() as f64 >= self.target() {
                break GcStatus::TargetReached;
            }

            let victim = match host.next_victim() {
                Some(victim) => victim,
                None => {
                    debug!("cannot find a victim block");
                    break GcStatus::NoVictim;
                }
            };
            host.reclaim(victim)?;
            reclaimed += 1;

            if reclaimed % self.progress_interval == 0 {
                let free = host.free_block_count();
                if free <= last_free {
                    info!("GC is not making progress ({} free blocks), giving up", free);
                    break GcStatus::NoProgress;
                }
                last_free = free;
            }
        };

        debug!(
            "garbage collection ends: {:?}, {} blocks reclaimed, {} free",
            status,
            reclaimed,
            host.free_block_count()
        );
        Ok(GcReport { status, reclaimed })
    }
}
