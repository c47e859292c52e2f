use std::collections::HashMap;

use log::{debug, error, trace, warn};

use super::{check_lpn, record_gc, Ftl};
use crate::blkpool::{BlockPool, BlockTag, Choice};
use crate::config::{BlockId, Config, Counter, Lpn, Ppn};
use crate::error::{FtlError, Result};
use crate::flash::{Category, FlashDevice, SimFlash};
use crate::gc::{GarbageCollector, GcReport, Reclaim};
use crate::geometry::Geometry;
use crate::oob::OutOfBand;
use crate::recorder::Recorder;

/// Block-mapped FTL: a logical block owns one physical block and pages keep
/// their offset. Updating a written block is read, erase, rewrite in place.
pub struct BlockMapFtl<F: FlashDevice = SimFlash> {
    geometry: Geometry,
    max_lpn: Lpn,
    flash: F,
    recorder: Recorder,
    pool: BlockPool,
    oob: OutOfBand,
    gc: GarbageCollector,
    blk_l2p: HashMap<BlockId, BlockId>,
    blk_p2l: HashMap<BlockId, BlockId>,
}

impl<F: FlashDevice> BlockMapFtl<F> {
    pub fn new(conf: &Config, flash: F) -> Result<Self> {
        conf.validate()?;
        let geometry = conf.geometry();
        debug!(
            "block-mapped ftl: {} blocks x {} pages, {} logical pages",
            geometry.num_blocks,
            geometry.pages_per_block,
            conf.logical_pages()
        );
        Ok(BlockMapFtl {
            geometry,
            max_lpn: conf.max_lpn(),
            flash,
            recorder: Recorder::new(),
            pool: BlockPool::new(geometry),
            oob: OutOfBand::new(geometry),
            gc: GarbageCollector::new(conf),
            blk_l2p: HashMap::new(),
            blk_p2l: HashMap::new(),
        })
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn oob(&self) -> &OutOfBand {
        &self.oob
    }

    /// Physical block backing logical block `lblock`.
    pub fn physical_block_of(&self, lblock: BlockId) -> Option<BlockId> {
        self.blk_l2p.get(&lblock).copied()
    }

    /// Physical page holding live data of `lpn`.
    pub fn lpn_to_ppn(&self, lpn: Lpn) -> Option<Ppn> {
        let (lblock, off) = self.geometry.page_to_block_off(lpn);
        let pblock = self.physical_block_of(lblock)?;
        let ppn = self.geometry.block_off_to_page(pblock, off);
        if self.oob.is_valid(ppn) {
            Some(ppn)
        } else {
            None
        }
    }

    pub fn garbage_collect(&mut self) -> Result<Option<GcReport>> {
        if !self.gc.needed(self.pool.count_blocks(BlockTag::Free)) {
            return Ok(None);
        }
        let gc = self.gc;
        let report = gc.collect(self)?;
        record_gc(&mut self.recorder, &report);
        Ok(Some(report))
    }

    fn map_new_block(&mut self, lblock: BlockId) -> Result<BlockId> {
        let pblock = match self
            .pool
            .pick_and_move(BlockTag::Free, BlockTag::Data, Choice::LeastErased)
        {
            Some(block) => block,
            None => {
                error!("no free block left for logical block {}", lblock);
                return Err(FtlError::PoolExhausted { tag: BlockTag::Free });
            }
        };
        self.blk_l2p.insert(lblock, pblock);
        self.blk_p2l.insert(pblock, lblock);
        trace!("logical block {} -> physical block {}", lblock, pblock);
        Ok(pblock)
    }

    /// Erase `pblock` in place, keeping its mapping. The block passes through free
    /// so its erase count follows the erase.
    fn erase_in_place(&mut self, pblock: BlockId) -> Result<()> {
        self.flash.erase_block(pblock, Category::Amplified);
        self.recorder.put("block_erase", pblock, Category::Amplified);
        self.oob.erase_block(pblock);
        self.pool.change_tag(pblock, BlockTag::Data, BlockTag::Free)?;
        self.pool.change_tag(pblock, BlockTag::Free, BlockTag::Data)
    }

    fn program(&mut self, ppn: Ppn, lpn: Lpn, data: Option<&[u8]>, cat: Category) -> Result<()> {
        self.flash.write_page(ppn, data, cat)?;
        self.recorder.put("page_write", ppn, cat);
        self.oob.validate(ppn, lpn);
        Ok(())
    }
}

impl<F: FlashDevice> Reclaim for BlockMapFtl<F> {
    fn free_block_count(&self) -> Counter {
        self.pool.count_blocks(BlockTag::Free)
    }

    /// Only blocks without a single live page; no partial compaction.
    fn next_victim(&self) -> Option<BlockId> {
        self.pool
            .blocks_of_tag(BlockTag::Data)
            .find(|&block| self.oob.valid_count(block) == 0)
    }

    fn reclaim(&mut self, block: BlockId) -> Result<()> {
        self.flash.erase_block(block, Category::Amplified);
        self.recorder.put("block_erase", block, Category::Amplified);
        self.oob.erase_block(block);
        if let Some(lblock) = self.blk_p2l.remove(&block) {
            self.blk_l2p.remove(&lblock);
        }
        self.pool.change_tag(block, BlockTag::Data, BlockTag::Free)?;
        self.recorder.count_me("gc", "victim");
        Ok(())
    }
}

impl<F: FlashDevice> Ftl for BlockMapFtl<F> {
    fn name(&self) -> &'static str {
        "block-mapped"
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

        let (lblock, off) = self.geometry.page_to_block_off(lpn);
        let pblock = match self.physical_block_of(lblock) {
            Some(pblock) => pblock,
            None => {
                // fresh block, nothing to preserve
                let pblock = self.map_new_block(lblock)?;
                let ppn = self.geometry.block_off_to_page(pblock, off);
                return self.program(ppn, lpn, data, Category::User);
            }
        };

        let target = self.geometry.block_off_to_page(pblock, off);
        let mut kept: Vec<(Ppn, Lpn, Option<Vec<u8>>)> = Vec::new();
        for ppn in self.oob.valid_pages(pblock).collect::<Vec<_>>() {
            if ppn == target {
                continue;
            }
            let owner = self.oob.lpn_of(ppn).ok_or_else(|| {
                FtlError::InvariantViolated(format!("valid ppn {} has no owning lpn", ppn))
            })?;
            let payload = self.flash.read_page(ppn, Category::Amplified);
            self.recorder.put("page_read", ppn, Category::Amplified);
            kept.push((ppn, owner, payload));
        }

        self.erase_in_place(pblock)?;

        // rewrite in offset order, up to the highest page touched
        let last = kept.last().map_or(target, |&(ppn, _, _)| ppn.max(target));
        let mut kept = kept.into_iter().peekable();
        for ppn in self.geometry.block_to_page_range(pblock) {
            if ppn > last {
                break;
            }
            if ppn == target {
                self.program(ppn, lpn, data, Category::User)?;
            } else if kept.peek().map_or(false, |(k, _, _)| *k == ppn) {
                if let Some((_, owner, payload)) = kept.next() {
                    self.program(ppn, owner, payload.as_deref(), Category::Amplified)?;
                }
            }
        }
        Ok(())
    }

    fn lba_discard(&mut self, lpn: Lpn) -> Result<()> {
        check_lpn(lpn, self.max_lpn)?;
        self.recorder.put("lba_discard", lpn, Category::User);
        match self.lpn_to_ppn(lpn) {
            Some(ppn) => self.oob.invalidate(ppn),
            None => warn!("discarding unmapped lpn {}", lpn),
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

    // 8 blocks x 4 pages, GC below 2 free blocks
    fn ftl() -> BlockMapFtl {
        let conf = Config::with_geometry(4096, 4, 8)
            .with_over_provisioning(50.0)
            .with_low_water_mark(0.25);
        BlockMapFtl::new(&conf, SimFlash::new(conf.geometry())).unwrap()
    }

    #[test]
    fn first_write_needs_no_erase() {
        let mut f = ftl();
        f.lba_write(5, Some(b"x")).unwrap();
        // logical block 1 got the first free block, offset kept
        assert_eq!(f.physical_block_of(1), Some(0));
        assert_eq!(f.lpn_to_ppn(5), Some(1));
        assert_eq!(f.flash().counts(Category::Amplified).erasures, 0);
        assert_eq!(f.write_amplification(), 1.0);
    }

    #[test]
    fn update_rewrites_valid_pages_in_place() {
        let mut f = ftl();
        f.lba_write(0, Some(b"a")).unwrap();
        // the block is mapped, so even an unwritten offset goes through erase
        f.lba_write(2, Some(b"c")).unwrap();
        f.lba_write(0, Some(b"A")).unwrap();

        assert_eq!(f.recorder().count("page_read", Category::Amplified), 2);
        assert_eq!(f.recorder().count("block_erase", Category::Amplified), 2);
        assert_eq!(f.recorder().count("page_write", Category::User), 3);
        assert_eq!(f.recorder().count("page_write", Category::Amplified), 2);
        assert_eq!(f.lba_read(0).unwrap(), Some(b"A".to_vec()));
        assert_eq!(f.lba_read(2).unwrap(), Some(b"c".to_vec()));
        assert_eq!(f.lba_read(1).unwrap(), None);
        assert_eq!(f.physical_block_of(0), Some(0));
        assert_eq!(f.block_pool().erasure_count(0), 2);
        assert_eq!(f.block_pool().tag_of(0), BlockTag::Data);
    }

    #[test]
    fn every_update_of_a_full_block_amplifies() {
        let mut f = ftl();
        // 0 + 1 + 2 + 3 pages carried along while filling the block
        f.write_range(0, 4, None).unwrap();
        f.lba_write(3, None).unwrap();
        assert_eq!(f.recorder().count("page_write", Category::Amplified), 9);
        assert_eq!(f.write_amplification(), 14.0 / 5.0);
    }

    #[test]
    fn gc_frees_fully_invalid_blocks_only() {
        let conf = Config::with_geometry(4096, 4, 8)
            .with_over_provisioning(0.0)
            .with_low_water_mark(0.25);
        let mut f = BlockMapFtl::new(&conf, SimFlash::new(conf.geometry())).unwrap();
        // logical blocks 0..3 -> physical 0..3
        f.write_range(0, 16, None).unwrap();
        f.discard_range(0, 4).unwrap();
        f.discard_range(4, 3).unwrap();
        assert_eq!(f.next_victim(), Some(0));

        // three more logical blocks leave a single free block
        f.write_range(16, 9, None).unwrap();
        assert_eq!(f.recorder().counter("gc", "victim"), 0);
        f.lba_write(25, None).unwrap();
        assert_eq!(f.recorder().counter("gc", "victim"), 1);
        assert_eq!(f.physical_block_of(0), None);
        // block 1 still holds lpn 7
        assert_eq!(f.physical_block_of(1), Some(1));
        assert_eq!(f.lpn_to_ppn(7), Some(7));
    }

    #[test]
    fn in_place_updates_need_no_free_block() {
        let conf = Config::with_geometry(4096, 4, 4)
            .with_over_provisioning(0.0)
            .with_low_water_mark(0.25);
        let mut f = BlockMapFtl::new(&conf, SimFlash::new(conf.geometry())).unwrap();
        f.write_range(0, 16, None).unwrap();
        assert_eq!(f.free_blocks(), 0);
        f.lba_write(0, None).unwrap();
        assert_eq!(f.lba_write(16, None), Err(FtlError::LpnOutOfRange { lpn: 16, max: 15 }));
    }
}
