use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use log::{error, trace};

use crate::config::{BlockId, Counter, Ppn};
use crate::error::{FtlError, Result};
use crate::geometry::Geometry;

/// Role of a block. Every block carries exactly one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockTag {
    Free,
    Data,
    Translation,
}

impl BlockTag {
    pub const ALL: [BlockTag; 3] = [BlockTag::Free, BlockTag::Data, BlockTag::Translation];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    LeastErased,
    MostErased,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub block_id: BlockId,
    pub tag: BlockTag,
    pub erase_counter: Counter,
}

impl Block {
    pub fn new(block_id: BlockId) -> Self {
        Block {
            block_id,
            tag: BlockTag::Free,
            erase_counter: 0,
        }
    }
}

/// An open block handing out its pages in order.
#[derive(Debug, Clone)]
pub struct CurrentBlock {
    pub block_id: BlockId,
    cursor: Counter, // points to the next unused offset
    pages_per_block: Counter,
    first_ppn: Ppn,
}

impl CurrentBlock {
    fn new(block_id: BlockId, geometry: &Geometry) -> Self {
        CurrentBlock {
            block_id,
            cursor: 0,
            pages_per_block: geometry.pages_per_block,
            first_ppn: geometry.block_off_to_page(block_id, 0),
        }
    }

    /// Up to `n` consecutive pages, fewer if the block runs out.
    pub fn next_ppns(&mut self, n: Counter) -> Vec<Ppn> {
        let end = (self.cursor + n).min(self.pages_per_block);
        let ppns = (self.cursor..end).map(|off| self.first_ppn + off).collect();
        self.cursor = end;
        ppns
    }

    pub fn num_free_pages(&self) -> Counter {
        self.pages_per_block - self.cursor
    }

    pub fn full(&self) -> bool {
        debug_assert!(self.cursor <= self.pages_per_block, "cursor ran past the block");
        self.cursor == self.pages_per_block
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WearStats {
    pub min: Counter,
    pub max: Counter,
    pub avg: f64,
    pub gap: Counter,
}

/// Tag-partitioned blocks with erase counts and per-tag open-block cursors.
#[derive(Debug)]
pub struct BlockPool {
    geometry: Geometry,
    blocks: Vec<Block>,
    members: BTreeMap<BlockTag, BTreeSet<BlockId>>,
    cur_blocks: BTreeMap<BlockTag, BTreeMap<usize, CurrentBlock>>,
}

impl BlockPool {
    pub fn new(geometry: Geometry) -> Self {
        let mut members: BTreeMap<BlockTag, BTreeSet<BlockId>> =
            BlockTag::ALL.iter().map(|&tag| (tag, BTreeSet::new())).collect();
        members.insert(BlockTag::Free, (0..geometry.num_blocks).collect());

        BlockPool {
            geometry,
            blocks: (0..geometry.num_blocks).map(Block::new).collect(),
            members,
            cur_blocks: BlockTag::ALL.iter().map(|&tag| (tag, BTreeMap::new())).collect(),
        }
    }

    pub fn total_blocks(&self) -> Counter {
        self.blocks.len()
    }

    pub fn count_blocks(&self, tag: BlockTag) -> Counter {
        self.members[&tag].len()
    }

    /// Blocks of `tag` in ascending id order.
    pub fn blocks_of_tag(&self, tag: BlockTag) -> impl Iterator<Item = BlockId> + '_ {
        self.members[&tag].iter().copied()
    }

    pub fn tag_of(&self, block: BlockId) -> BlockTag {
        self.blocks[block].tag
    }

    pub fn change_tag(&mut self, block: BlockId, src: BlockTag, dst: BlockTag) -> Result<()> {
        let actual = self.blocks[block].tag;
        if actual != src {
            error!("block {} is {:?}, cannot move it from {:?}", block, actual, src);
            return Err(FtlError::TagMismatch {
                block,
                expected: src,
                actual,
            });
        }

        self.members.entry(src).or_default().remove(&block);
        self.members.entry(dst).or_default().insert(block);
        self.blocks[block].tag = dst;

        if dst == BlockTag::Free && src != BlockTag::Free {
            self.blocks[block].erase_counter += 1;
            // a free block cannot stay open
            for cursors in self.cur_blocks.values_mut() {
                cursors.retain(|_, cur| cur.block_id != block);
            }
        }
        trace!("block {} {:?} -> {:?}", block, src, dst);
        Ok(())
    }

    /// Least or most erased block of `tag`, lowest id on ties. The block stays where it is.
    pub fn pick(&self, tag: BlockTag, choice: Choice) -> Option<BlockId> {
        let candidates = self.members[&tag].iter().copied();
        match choice {
            Choice::LeastErased => candidates.min_by_key(|&b| (self.blocks[b].erase_counter, b)),
            Choice::MostErased => {
                candidates.min_by_key(|&b| (Reverse(self.blocks[b].erase_counter), b))
            }
        }
    }

    pub fn pick_and_move(&mut self, src: BlockTag, dst: BlockTag, choice: Choice) -> Option<BlockId> {
        let block = self.pick(src, choice)?;
        // picked from src, the tag matches
        self.change_tag(block, src, dst).ok()?;
        Some(block)
    }

    pub fn erasure_count(&self, block: BlockId) -> Counter {
        self.blocks[block].erase_counter
    }

    /// erase count -> number of blocks with that count
    pub fn erasure_count_distribution(&self) -> BTreeMap<Counter, Counter> {
        let mut dist = BTreeMap::new();
        for block in &self.blocks {
            *dist.entry(block.erase_counter).or_insert(0) += 1;
        }
        dist
    }

    pub fn wear_stats(&self) -> WearStats {
        let counts = self.blocks.iter().map(|b| b.erase_counter);
        let min = counts.clone().min().unwrap_or(0);
        let max = counts.clone().max().unwrap_or(0);
        let avg = counts.sum::<Counter>() as f64 / self.blocks.len().max(1) as f64;
        WearStats {
            min,
            max,
            avg,
            gap: max - min,
        }
    }

    /// Open `block` (already tagged `tag`) as cursor `index` of `tag`.
    pub fn set_new_cur_block(&mut self, tag: BlockTag, index: usize, block: BlockId) -> Result<()> {
        let actual = self.blocks[block].tag;
        if actual != tag {
            return Err(FtlError::TagMismatch {
                block,
                expected: tag,
                actual,
            });
        }
        let cur = CurrentBlock::new(block, &self.geometry);
        self.cur_blocks.entry(tag).or_default().insert(index, cur);
        Ok(())
    }

    pub fn cur_block(&self, tag: BlockTag, index: usize) -> Option<&CurrentBlock> {
        self.cur_blocks.get(&tag)?.get(&index)
    }

    /// Pages left in the open block only; empty when there is none or it is full.
    pub fn next_ppns(&mut self, n: Counter, tag: BlockTag, index: usize) -> Vec<Ppn> {
        match self.cur_blocks.get_mut(&tag).and_then(|c| c.get_mut(&index)) {
            Some(cur) => cur.next_ppns(n),
            None => Vec::new(),
        }
    }

    /// Like `next_ppns`, but opens fresh blocks from the free pool until `n` pages are found.
    pub fn next_ppns_or_alloc(
        &mut self,
        n: Counter,
        tag: BlockTag,
        index: usize,
        choice: Choice,
    ) -> Result<Vec<Ppn>> {
        let mut ppns = Vec::with_capacity(n);
        while ppns.len() < n {
            let got = self.next_ppns(n - ppns.len(), tag, index);
            if got.is_empty() {
                let block = match self.pick_and_move(BlockTag::Free, tag, choice) {
                    Some(block) => block,
                    None => {
                        error!("no free block left for {:?} cursor {}", tag, index);
                        return Err(FtlError::PoolExhausted { tag: BlockTag::Free });
                    }
                };
                self.set_new_cur_block(tag, index, block)?;
            }
            ppns.extend(got);
        }
        Ok(ppns)
    }

    /// Detach full cursors so their blocks become GC candidates.
    pub fn remove_full_cur_blocks(&mut self) {
        for cursors in self.cur_blocks.values_mut() {
            cursors.retain(|_, cur| !cur.full());
        }
    }

    pub fn current_blocks(&self) -> Vec<BlockId> {
        self.cur_blocks
            .values()
            .flat_map(|cursors| cursors.values().map(|cur| cur.block_id))
            .collect()
    }

    pub fn is_current(&self, block: BlockId) -> bool {
        self.cur_blocks
            .values()
            .any(|cursors| cursors.values().any(|cur| cur.block_id == block))
    }
}
