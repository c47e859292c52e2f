//! Flash translation layers: complete write algorithms built from the block
//! pool, the mapping layer and the garbage collector.

pub mod blockmap;
pub mod pagemap;

pub use blockmap::BlockMapFtl;
pub use pagemap::PageMapFtl;

use std::collections::BTreeMap;

use byte_unit::Byte;
use log::{debug, warn};

use crate::blkpool::{BlockPool, BlockTag};
use crate::config::{Config, Counter, Lpn};
use crate::error::{FtlError, Result};
use crate::flash::{Category, SimFlash};
use crate::gc::{GcReport, GcStatus};
use crate::recorder::Recorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtlKind {
    PageMapped,
    BlockMapped,
}

/// Host-facing operations shared by every mapping scheme.
pub trait Ftl {
    fn name(&self) -> &'static str;

    /// `None` for a page that was never written or has been discarded.
    fn lba_read(&mut self, lpn: Lpn) -> Result<Option<Vec<u8>>>;

    fn lba_write(&mut self, lpn: Lpn, data: Option<&[u8]>) -> Result<()>;

    /// Discarding an unmapped page is a logged no-op.
    fn lba_discard(&mut self, lpn: Lpn) -> Result<()>;

    fn recorder(&self) -> &Recorder;

    fn block_pool(&self) -> &BlockPool;

    fn max_lpn(&self) -> Lpn;

    fn free_blocks(&self) -> Counter {
        self.block_pool().count_blocks(BlockTag::Free)
    }

    fn erasure_count_distribution(&self) -> BTreeMap<Counter, Counter> {
        self.block_pool().erasure_count_distribution()
    }

    /// Programmed pages per page the host asked for.
    fn write_amplification(&self) -> f64 {
        let rec = self.recorder();
        let user = rec.count("page_write", Category::User);
        if user == 0 {
            return 1.0;
        }
        (user + rec.count("page_write", Category::Amplified)) as f64 / user as f64
    }

    /// One-line summary of the device and what the host has seen so far.
    fn describe(&self, page_size: usize) -> String {
        let pool = self.block_pool();
        let logical = (self.max_lpn() + 1) * page_size;
        format!(
            "{}: {} blocks, user capacity {}, {} free blocks, WAF {:.3}",
            self.name(),
            pool.total_blocks(),
            Byte::from(logical).get_appropriate_unit(true),
            self.free_blocks(),
            self.write_amplification()
        )
    }

    fn read_range(&mut self, start: Lpn, npages: Counter) -> Result<Vec<Option<Vec<u8>>>> {
        (start..start + npages).map(|lpn| self.lba_read(lpn)).collect()
    }

    fn write_range(&mut self, start: Lpn, npages: Counter, data: Option<&[u8]>) -> Result<()> {
        for lpn in start..start + npages {
            self.lba_write(lpn, data)?;
        }
        Ok(())
    }

    fn discard_range(&mut self, start: Lpn, npages: Counter) -> Result<()> {
        for lpn in start..start + npages {
            self.lba_discard(lpn)?;
        }
        Ok(())
    }
}

/// Pick the mapping scheme once; callers only see the trait afterwards.
pub fn build_ftl(kind: FtlKind, conf: &Config) -> Result<Box<dyn Ftl>> {
    let flash = SimFlash::new(conf.geometry());
    let ftl: Box<dyn Ftl> = match kind {
        FtlKind::PageMapped => Box::new(PageMapFtl::new(conf, flash)?),
        FtlKind::BlockMapped => Box::new(BlockMapFtl::new(conf, flash)?),
    };
    Ok(ftl)
}

/// A run that erased something is a cycle, one that found nothing is idle.
pub(crate) fn record_gc(rec: &mut Recorder, report: &GcReport) {
    if report.reclaimed > 0 {
        rec.count_me("gc", "cycle");
    } else {
        rec.count_me("gc", "idle");
    }
    match report.status {
        GcStatus::TargetReached => {}
        GcStatus::NoVictim => debug!("gc found no more victims after {} blocks", report.reclaimed),
        GcStatus::NoProgress => warn!(
            "gc gave up after {} blocks, free space is under pressure",
            report.reclaimed
        ),
    }
}

pub(crate) fn check_lpn(lpn: Lpn, max: Lpn) -> Result<()> {
    if lpn > max {
        return Err(FtlError::LpnOutOfRange { lpn, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_kinds_build_and_roundtrip() {
        let conf = Config::with_geometry(4096, 4, 16).with_low_water_mark(0.25);
        for kind in [FtlKind::PageMapped, FtlKind::BlockMapped] {
            let mut ftl = build_ftl(kind, &conf).unwrap();
            ftl.write_range(0, 4, Some(b"x")).unwrap();
            assert_eq!(ftl.read_range(0, 5).unwrap()[4], None);
            assert_eq!(ftl.lba_read(2).unwrap(), Some(b"x".to_vec()));
            ftl.discard_range(0, 2).unwrap();
            assert_eq!(ftl.lba_read(1).unwrap(), None);
            assert_eq!(
                ftl.lba_write(ftl.max_lpn() + 1, None),
                Err(FtlError::LpnOutOfRange { lpn: ftl.max_lpn() + 1, max: ftl.max_lpn() })
            );
        }
    }

    #[test]
    fn describe_reports_user_capacity() {
        let conf = Config::with_geometry(4096, 4, 16).with_over_provisioning(0.0);
        let ftl = build_ftl(FtlKind::PageMapped, &conf).unwrap();
        let banner = ftl.describe(conf.page_size);
        assert!(banner.starts_with("page-mapped: 16 blocks"), "{}", banner);
        assert!(banner.contains("256"), "{}", banner);
    }

    #[test]
    fn invalid_config_rejected() {
        let conf = Config::with_geometry(4096, 4, 16).with_low_water_mark(1.5);
        assert!(build_ftl(FtlKind::PageMapped, &conf).is_err());
    }
}
