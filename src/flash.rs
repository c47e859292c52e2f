use std::collections::HashMap;

use log::trace;

use crate::config::{BlockId, Counter, Ppn};
use crate::error::{FtlError, Result};
use crate::geometry::Geometry;

/// Who caused a device operation; accounting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    User,
    Amplified,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::User => "user",
            Category::Amplified => "amplified",
        }
    }
}

/// The physical flash as seen by the FTL. Every call completes before returning.
pub trait FlashDevice {
    fn read_page(&mut self, ppn: Ppn, cat: Category) -> Option<Vec<u8>>;
    fn write_page(&mut self, ppn: Ppn, data: Option<&[u8]>, cat: Category) -> Result<()>;
    fn erase_block(&mut self, block: BlockId, cat: Category);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub reads: Counter,
    pub writes: Counter,
    pub erasures: Counter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Erased,
    Programmed,
}

/// In-memory flash: keeps page payloads and refuses to program a page twice between erases.
#[derive(Debug)]
pub struct SimFlash {
    geometry: Geometry,
    states: Vec<PageState>,
    data: HashMap<Ppn, Vec<u8>>,
    user: OpCounts,
    amplified: OpCounts,
}

impl SimFlash {
    pub fn new(geometry: Geometry) -> Self {
        SimFlash {
            geometry,
            states: vec![PageState::Erased; geometry.total_pages()],
            data: HashMap::new(),
            user: OpCounts::default(),
            amplified: OpCounts::default(),
        }
    }

    pub fn counts(&self, cat: Category) -> OpCounts {
        match cat {
            Category::User => self.user,
            Category::Amplified => self.amplified,
        }
    }

    pub fn is_programmed(&self, ppn: Ppn) -> bool {
        self.states[ppn] == PageState::Programmed
    }

    fn counts_mut(&mut self, cat: Category) -> &mut OpCounts {
        match cat {
            Category::User => &mut self.user,
            Category::Amplified => &mut self.amplified,
        }
    }
}

impl FlashDevice for SimFlash {
    fn read_page(&mut self, ppn: Ppn, cat: Category) -> Option<Vec<u8>> {
        self.counts_mut(cat).reads += 1;
        self.data.get(&ppn).cloned()
    }

    fn write_page(&mut self, ppn: Ppn, data: Option<&[u8]>, cat: Category) -> Result<()> {
        if self.states[ppn] == PageState::Programmed {
            return Err(FtlError::ProgramWithoutErase { ppn });
        }
        self.states[ppn] = PageState::Programmed;
        match data {
            Some(bytes) => {
                self.data.insert(ppn, bytes.to_vec());
            }
            None => {
                self.data.remove(&ppn);
            }
        }
        self.counts_mut(cat).writes += 1;
        trace!("program ppn {} ({})", ppn, cat.as_str());
        Ok(())
    }

    fn erase_block(&mut self, block: BlockId, cat: Category) {
        for ppn in self.geometry.block_to_page_range(block) {
            self.states[ppn] = PageState::Erased;
            self.data.remove(&ppn);
        }
        self.counts_mut(cat).erasures += 1;
        trace!("erase block {} ({})", block, cat.as_str());
    }
}
