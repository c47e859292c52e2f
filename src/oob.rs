use std::ops::Range;

use crate::config::{BlockId, Counter, Lpn, Ppn};
use crate::geometry::Geometry;

const WORD_BITS: usize = u64::BITS as usize;

/// One bit per physical page, set while the page holds live data.
#[derive(Debug, Clone)]
pub struct ValidityBitmap {
    words: Vec<u64>,
    len: usize,
}

impl ValidityBitmap {
    pub fn new(len: usize) -> Self {
        ValidityBitmap {
            words: vec![0; (len + WORD_BITS - 1) / WORD_BITS],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_valid(&self, ppn: Ppn) -> bool {
        self.words[ppn / WORD_BITS] & (1u64 << (ppn % WORD_BITS)) != 0
    }

    pub fn validate(&mut self, ppn: Ppn) {
        self.words[ppn / WORD_BITS] |= 1u64 << (ppn % WORD_BITS);
    }

    pub fn invalidate(&mut self, ppn: Ppn) {
        self.words[ppn / WORD_BITS] &= !(1u64 << (ppn % WORD_BITS));
    }

    pub fn invalidate_range(&mut self, range: Range<Ppn>) {
        for ppn in range {
            self.invalidate(ppn);
        }
    }

    pub fn count_valid_in(&self, range: Range<Ppn>) -> Counter {
        range.filter(|&ppn| self.is_valid(ppn)).count()
    }
}

/// Per-page state a real device keeps in the spare area: validity and owning lpn.
#[derive(Debug, Clone)]
pub struct OutOfBand {
    geometry: Geometry,
    bitmap: ValidityBitmap,
    lpn_of_page: Vec<Option<Lpn>>,
}

impl OutOfBand {
    pub fn new(geometry: Geometry) -> Self {
        OutOfBand {
            geometry,
            bitmap: ValidityBitmap::new(geometry.total_pages()),
            lpn_of_page: vec![None; geometry.total_pages()],
        }
    }

    pub fn is_valid(&self, ppn: Ppn) -> bool {
        self.bitmap.is_valid(ppn)
    }

    pub fn validate(&mut self, ppn: Ppn, lpn: Lpn) {
        self.bitmap.validate(ppn);
        self.lpn_of_page[ppn] = Some(lpn);
    }

    /// Drops the reverse mapping too; a stale page has no owner.
    pub fn invalidate(&mut self, ppn: Ppn) {
        self.bitmap.invalidate(ppn);
        self.lpn_of_page[ppn] = None;
    }

    pub fn lpn_of(&self, ppn: Ppn) -> Option<Lpn> {
        self.lpn_of_page[ppn]
    }

    pub fn erase_block(&mut self, block: BlockId) {
        let range = self.geometry.block_to_page_range(block);
        self.bitmap.invalidate_range(range.clone());
        for ppn in range {
            self.lpn_of_page[ppn] = None;
        }
    }

    pub fn valid_pages(&self, block: BlockId) -> impl Iterator<Item = Ppn> + '_ {
        self.geometry
            .block_to_page_range(block)
            .filter(move |&ppn| self.bitmap.is_valid(ppn))
    }

    pub fn valid_count(&self, block: BlockId) -> Counter {
        self.bitmap.count_valid_in(self.geometry.block_to_page_range(block))
    }

    pub fn block_invalid_ratio(&self, block: BlockId) -> f64 {
        let ppb = self.geometry.pages_per_block;
        (ppb - self.valid_count(block)) as f64 / ppb as f64
    }
}
