use std::ops::Range;

use num_integer::Integer;

use crate::config::{BaseType, BlockId, Counter, Lpn, Ppn};
use crate::error::{FtlError, Result};

/// Page/block address arithmetic. Stateless, cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub page_size: BaseType,
    pub pages_per_block: BaseType,
    pub num_blocks: BaseType,
    /// Mapping entries stored in one translation page.
    pub entries_per_translation_page: BaseType,
}

impl Geometry {
    pub fn new(
        page_size: BaseType,
        pages_per_block: BaseType,
        num_blocks: BaseType,
        entries_per_translation_page: BaseType,
    ) -> Self {
        Geometry {
            page_size,
            pages_per_block,
            num_blocks,
            entries_per_translation_page: entries_per_translation_page.max(1),
        }
    }

    pub fn total_pages(&self) -> Counter {
        self.pages_per_block * self.num_blocks
    }

    /// (block, page offset)
    pub fn page_to_block_off(&self, page: BaseType) -> (BlockId, BaseType) {
        page.div_rem(&self.pages_per_block)
    }

    pub fn block_off_to_page(&self, block: BlockId, offset: BaseType) -> BaseType {
        debug_assert!(offset < self.pages_per_block);
        block * self.pages_per_block + offset
    }

    pub fn block_to_page_range(&self, block: BlockId) -> Range<Ppn> {
        block * self.pages_per_block..(block + 1) * self.pages_per_block
    }

    /// Byte offset to page number; the offset must be page aligned.
    pub fn byte_to_page(&self, offset: BaseType) -> Result<BaseType> {
        let (page, rem) = offset.div_rem(&self.page_size);
        if rem != 0 {
            return Err(FtlError::InvariantViolated(format!(
                "offset {} is not aligned to page size {}",
                offset, self.page_size
            )));
        }
        Ok(page)
    }

    /// (start page, page count) covering `size` bytes at `offset`, partial pages included.
    pub fn off_size_to_page_range(&self, offset: BaseType, size: BaseType) -> (Lpn, Counter) {
        let start = offset / self.page_size;
        let end = Integer::div_ceil(&(offset + size), &self.page_size);
        (start, end - start)
    }

    /// Translation page ("m_vpn") holding the mapping entry of `lpn`.
    pub fn lpn_to_m_vpn(&self, lpn: Lpn) -> BaseType {
        lpn / self.entries_per_translation_page
    }

    pub fn m_vpn_to_lpn_range(&self, m_vpn: BaseType) -> Range<Lpn> {
        let start = m_vpn * self.entries_per_translation_page;
        start..start + self.entries_per_translation_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> Geometry {
        Geometry::new(4096, 4, 8, 512)
    }

    #[test]
    fn page_block_conversion() {
        let g = geo();
        assert_eq!(g.page_to_block_off(0), (0, 0));
        assert_eq!(g.page_to_block_off(9), (2, 1));
        assert_eq!(g.block_off_to_page(2, 1), 9);
        assert_eq!(g.block_to_page_range(3), 12..16);
        assert_eq!(g.total_pages(), 32);
    }

    #[test]
    fn byte_offsets() {
        let g = geo();
        assert_eq!(g.byte_to_page(8192), Ok(2));
        assert!(g.byte_to_page(100).is_err());
        assert_eq!(g.off_size_to_page_range(4000, 200), (0, 2));
        assert_eq!(g.off_size_to_page_range(4096, 4096), (1, 1));
    }

    #[test]
    fn translation_pages() {
        let g = geo();
        assert_eq!(g.lpn_to_m_vpn(511), 0);
        assert_eq!(g.lpn_to_m_vpn(512), 1);
        assert_eq!(g.m_vpn_to_lpn_range(1), 512..1024);
    }
}
