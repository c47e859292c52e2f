use log::{debug, trace, warn};

use super::{check_lpn, record_gc, Ftl};
use crate::blkpool::{BlockPool, BlockTag, Choice};
use crate::config::{BlockId, Config, Counter, Lpn, Ppn};
use crate::error::{FtlError, Result};
use crate::flash::{Category, FlashDevice, SimFlash};
use crate::gc::{GarbageCollector, GcReport, Reclaim};
use crate::geometry::Geometry;
use crate::mapping::MappingManager;
use crate::recorder::Recorder;

/// Cursor index of the open data block. Host writes and GC migration share it.
pub const DATA_CURSOR: usize = 0;

/// Log-structured, page-mapped FTL. Every write appends to an open block and
/// invalidates the previous copy; GC compacts the blocks with the most stale pages.
pub struct PageMapFtl<F: FlashDevice = SimFlash> {
    geometry: Geometry,
    max_lpn: Lpn,
    flash: F,
    recorder: Recorder,
    pool: BlockPool,
    mapping: MappingManager,
    gc: GarbageCollector,
    last_gc: Option<GcReport>,
}

impl<F: FlashDevice> PageMapFtl<F> {
    pub fn new(conf: &Config, flash: F) -> Result<Self> {
        conf.validate()?;
        let geometry = conf.geometry();
        debug!(
            "page-mapped ftl: {} blocks x {} pages, {} logical pages, low water mark {} blocks",
            geometry.num_blocks,
            geometry.pages_per_block,
            conf.logical_pages(),
            conf.low_water_mark()
        );
        Ok(PageMapFtl {
            geometry,
            max_lpn: conf.max_lpn(),
            flash,
            recorder: Recorder::new(),
            pool: BlockPool::new(geometry),
            mapping: MappingManager::new(conf)?,
            gc: GarbageCollector::new(conf),
            last_gc: None,
        })
    }

    pub fn mapping(&self) -> &MappingManager {
        &self.mapping
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn last_gc_report(&self) -> Option<GcReport> {
        self.last_gc
    }

    /// Current physical page of `lpn`, going through the mapping cache.
    pub fn lpn_to_ppn(&mut self, lpn: Lpn) -> Option<Ppn> {
        self.mapping.lpn_to_ppn(lpn, &mut self.recorder)
    }

    /// Run GC if free blocks are below the low water mark.
    pub fn garbage_collect(&mut self) -> Result<Option<GcReport>> {
        if !self.gc.needed(self.pool.count_blocks(BlockTag::Free)) {
            return Ok(None);
        }
        let gc = self.gc;
        let report = gc.collect(self)?;
        record_gc(&mut self.recorder, &report);
        self.last_gc = Some(report);
        Ok(Some(report))
    }

    /// Append one page to the open block and point `lpn` at it.
    fn append(&mut self, lpn: Lpn, data: Option<&[u8]>, cat: Category) -> Result<Ppn> {
        let ppns = self
            .pool
            .next_ppns_or_alloc(1, BlockTag::Data, DATA_CURSOR, Choice::LeastErased)?;
        self.pool.remove_full_cur_blocks();
        let ppn = match ppns.first() {
            Some(&ppn) => ppn,
            None => return Err(FtlError::PoolExhausted { tag: BlockTag::Free }),
        };

        self.flash.write_page(ppn, data, cat)?;
        self.recorder.put("page_write", ppn, cat);
        self.mapping.update_mapping(lpn, ppn, &mut self.recorder)?;
        Ok(ppn)
    }

    /// Pages that can still be appended before the free pool runs dry.
    fn relocation_room(&self) -> Counter {
        let open = self
            .pool
            .cur_block(BlockTag::Data, DATA_CURSOR)
            .map_or(0, |cur| cur.num_free_pages());
        open + self.pool.count_blocks(BlockTag::Free) * self.geometry.pages_per_block
    }
}

impl<F: FlashDevice> Reclaim for PageMapFtl<F> {
    fn free_block_count(&self) -> Counter {
        self.pool.count_blocks(BlockTag::Free)
    }

    /// Highest invalid ratio among closed data blocks, lowest id first on ties.
    /// Blocks whose live pages would not fit in the remaining space are skipped.
    fn next_victim(&self) -> Option<BlockId> {
        let oob = self.mapping.oob();
        let room = self.relocation_room();
        let mut victim: Option<(BlockId, f64)> = None;
        for block in self.pool.blocks_of_tag(BlockTag::Data) {
            if self.pool.is_current(block) || oob.valid_count(block) > room {
                continue;
            }
            let ratio = oob.block_invalid_ratio(block);
            if ratio <= 0.0 {
                continue;
            }
            match victim {
                Some((_, best)) if best >= ratio => {}
                _ => victim = Some((block, ratio)),
            }
        }
        victim.map(|(block, _)| block)
    }

    fn reclaim(&mut self, block: BlockId) -> Result<()> {
        let live: Vec<Ppn> = self.mapping.oob().valid_pages(block).collect();
        trace!("reclaim block {}: {} valid pages to move", block, live.len());

        for ppn in live {
            let lpn = self.mapping.oob().lpn_of(ppn).ok_or_else(|| {
                FtlError::InvariantViolated(format!("valid ppn {} has no owning lpn", ppn))
            })?;
            let data = self.flash.read_page(ppn, Category::Amplified);
            self.recorder.put("page_read", ppn, Category::Amplified);
            self.append(lpn, data.as_deref(), Category::Amplified)?;
        }

        self.flash.erase_block(block, Category::Amplified);
        self.recorder.put("block_erase", block, Category::Amplified);
        self.mapping.erase_block(block)?;
        self.pool.change_tag(block, BlockTag::Data, BlockTag::Free)?;
        self.recorder.count_me("gc", "victim");
        Ok(())
    }
}

impl<F: FlashDevice> Ftl for PageMapFtl<F> {
    fn name(&self) -> &'static str {
        "page-mapped"
    }

    fn lba_read(&mut self, lpn: Lpn) -> Result<Option<Vec<u8>>> {
        check_lpn(lpn, self.max_lpn)?;
        self.recorder.put("lba_read", lpn, Category::User);
        let ppn = match self.lpn_to_ppn(lpn) {
            Some(ppn) => ppn,
            None => return Ok(None),
        };
        let data = self.flash.read_page(ppn, Category::User);
        self.recorder.put("page_read", ppn, Category::User);
        Ok(Some(data.unwrap_or_default()))
    }

    fn lba_write(&mut self, lpn: Lpn, data: Option<&[u8]>) -> Result<()> {
        check_lpn(lpn, self.max_lpn)?;
        self.recorder.put("lba_write", lpn, Category::User);
        self.garbage_collect()?;
        self.append(lpn, data, Category::User)?;
        Ok(())
    }

    fn lba_discard(&mut self, lpn: Lpn) -> Result<()> {
        check_lpn(lpn, self.max_lpn)?;
        self.recorder.put("lba_discard", lpn, Category::User);
        if self.mapping.remove_mapping(lpn, &mut self.recorder)?.is_none() {
            warn!("discarding unmapped lpn {}", lpn);
        }
        Ok(())
    }

    fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    fn block_pool(&self) -> &BlockPool {
        &self.pool
    }

    fn max_lpn(&self) -> Lpn {
        self.max_lpn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::gc::GcStatus;

    // 8 blocks x 4 pages, half hidden from the host, GC below 2 free blocks
    fn ftl() -> PageMapFtl {
        let conf = Config::with_geometry(4096, 4, 8)
            .with_over_provisioning(50.0)
            .with_low_water_mark(0.25)
            .with_cache(CacheConfig::lru(8));
        PageMapFtl::new(&conf, SimFlash::new(conf.geometry())).unwrap()
    }

    #[test]
    fn sequential_writes_fill_blocks_in_order() {
        let mut f = ftl();
        f.write_range(0, 8, None).unwrap();
        for lpn in 0..8 {
            assert_eq!(f.lpn_to_ppn(lpn), Some(lpn));
        }
        assert_eq!(f.free_blocks(), 6);
        assert!(!f.block_pool().is_current(0));
    }

    #[test]
    fn overwrite_moves_and_invalidates() {
        let mut f = ftl();
        f.lba_write(3, Some(b"old")).unwrap();
        let first = f.lpn_to_ppn(3).unwrap();
        f.lba_write(3, Some(b"new")).unwrap();
        let second = f.lpn_to_ppn(3).unwrap();
        assert_ne!(first, second);
        assert!(!f.mapping().oob().is_valid(first));
        assert!(f.mapping().oob().is_valid(second));
        assert_eq!(f.lba_read(3).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn unmapped_read_does_not_touch_flash() {
        let mut f = ftl();
        assert_eq!(f.lba_read(5).unwrap(), None);
        assert_eq!(f.flash().counts(Category::User).reads, 0);
        assert_eq!(f.recorder().count("lba_read", Category::User), 1);
    }

    #[test]
    fn discard_twice_is_noop() {
        let mut f = ftl();
        f.lba_write(1, None).unwrap();
        f.lba_discard(1).unwrap();
        f.lba_discard(1).unwrap();
        assert_eq!(f.lba_read(1).unwrap(), None);
    }

    #[test]
    fn reclaim_migrates_live_pages_as_amplified() {
        let mut f = ftl();
        // lpn 0 stays live in block 0, the rest of block 0 goes stale
        f.write_range(0, 4, Some(b"a")).unwrap();
        f.write_range(1, 3, Some(b"b")).unwrap();
        f.reclaim(0).unwrap();

        assert_eq!(f.recorder().count("page_write", Category::Amplified), 1);
        assert_eq!(f.flash().counts(Category::Amplified).erasures, 1);
        // lands on the last page of the open block, behind the overwrites
        assert_eq!(f.lpn_to_ppn(0), Some(7));
        assert!(!f.block_pool().is_current(1));
        assert_eq!(f.lba_read(0).unwrap(), Some(b"a".to_vec()));
        assert_eq!(f.block_pool().tag_of(0), BlockTag::Free);
        assert_eq!(f.block_pool().erasure_count(0), 1);
        assert!(f.write_amplification() > 1.0);
    }

    #[test]
    fn overwrites_trigger_gc() {
        let mut f = ftl();
        for _ in 0..8 {
            f.write_range(4, 4, Some(b"c")).unwrap();
        }
        assert_eq!(f.recorder().counter("gc", "victim"), 2);
        assert_eq!(f.free_blocks(), 2);
        assert_eq!(f.lba_read(7).unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn victim_skips_open_blocks() {
        let mut f = ftl();
        f.lba_write(0, None).unwrap();
        f.lba_write(0, None).unwrap();
        // block 0 has a stale page but is still open
        assert_eq!(f.next_victim(), None);
        f.lba_write(0, None).unwrap();
        f.lba_write(0, None).unwrap();
        f.lba_write(1, None).unwrap();
        assert_eq!(f.next_victim(), Some(0));
    }

    #[test]
    fn gc_stops_at_target() {
        let mut f = ftl();
        f.write_range(0, 16, None).unwrap();
        assert_eq!(f.free_blocks(), 4);
        assert_eq!(f.last_gc_report(), None);

        f.write_range(0, 16, None).unwrap();
        // blocks 0 and 1 went fully stale and were enough to reach 3 free
        assert_eq!(
            f.last_gc_report(),
            Some(GcReport { status: GcStatus::TargetReached, reclaimed: 2 })
        );
        assert_eq!(f.recorder().counter("gc", "cycle"), 1);
        assert_eq!(f.free_blocks(), 2);
    }

    #[test]
    fn full_drive_without_stale_pages_is_exhausted() {
        let conf = Config::with_geometry(4096, 4, 4)
            .with_over_provisioning(0.0)
            .with_low_water_mark(0.25);
        let mut f = PageMapFtl::new(&conf, SimFlash::new(conf.geometry())).unwrap();
        f.write_range(0, 16, None).unwrap();

        assert_eq!(
            f.lba_write(0, None),
            Err(FtlError::PoolExhausted { tag: BlockTag::Free })
        );
        assert_eq!(
            f.last_gc_report(),
            Some(GcReport { status: GcStatus::NoVictim, reclaimed: 0 })
        );
        // the old copy is still the live one
        assert_eq!(f.lpn_to_ppn(0), Some(0));
    }

    #[test]
    fn gc_gives_up_when_migration_eats_the_freed_block() {
        let conf = Config::with_geometry(4096, 4, 8)
            .with_over_provisioning(40.0)
            .with_low_water_mark(0.5)
            .with_gc_progress_interval(1)
            .with_cache(CacheConfig::lru(8));
        let mut f = PageMapFtl::new(&conf, SimFlash::new(conf.geometry())).unwrap();
        let trace = [12, 13, 1, 8, 16, 15, 12, 9, 15, 11, 18, 6, 16, 4, 9, 4, 3];
        for &lpn in trace.iter() {
            f.lba_write(lpn, None).unwrap();
        }
        assert_eq!(f.free_blocks(), 3);
        assert_eq!(f.last_gc_report(), None);

        // block 1 holds one live page and frees a block; block 0 holds three,
        // which spill into a newly opened block
        f.lba_write(19, None).unwrap();
        assert_eq!(
            f.last_gc_report(),
            Some(GcReport { status: GcStatus::NoProgress, reclaimed: 2 })
        );
        assert_eq!(f.recorder().count("page_write", Category::Amplified), 4);
        assert_eq!(f.block_pool().erasure_count(0), 1);
        assert_eq!(f.block_pool().erasure_count(1), 1);
        assert_eq!(f.free_blocks(), 4);
        assert_eq!(f.lpn_to_ppn(19), Some(21));
    }
}
