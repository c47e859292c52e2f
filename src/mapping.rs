use log::{debug, trace};

use crate::cache::{build_cache, TranslationCache};
use crate::config::{BaseType, BlockId, Config, Counter, Lpn, Ppn};
use crate::error::{FtlError, Result};
use crate::geometry::Geometry;
use crate::oob::OutOfBand;
use crate::recorder::Recorder;

/// One lpn -> ppn translation. `ppn == None` means unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    pub lpn: Lpn,
    pub ppn: Option<Ppn>,
    pub dirty: bool,
}

/// The full translation table, standing in for the copy kept on flash.
#[derive(Debug)]
pub struct GlobalMappingTable {
    geometry: Geometry,
    entries: Vec<Option<Ppn>>,
}

impl GlobalMappingTable {
    pub fn new(geometry: Geometry, logical_pages: Counter) -> Self {
        GlobalMappingTable {
            geometry,
            entries: vec![None; logical_pages],
        }
    }

    pub fn load_entry(&self, lpn: Lpn) -> MappingEntry {
        MappingEntry {
            lpn,
            ppn: self.entries.get(lpn).copied().flatten(),
            dirty: false,
        }
    }

    pub fn store_entry(&mut self, entry: &MappingEntry) {
        if let Some(slot) = self.entries.get_mut(entry.lpn) {
            *slot = entry.ppn;
        }
    }

    /// Translation page holding the entry of `lpn`.
    pub fn translation_page_of(&self, lpn: Lpn) -> BaseType {
        self.geometry.lpn_to_m_vpn(lpn)
    }

    pub fn total_entries(&self) -> Counter {
        self.entries.len()
    }

    pub fn total_translation_pages(&self) -> Counter {
        self.geometry.lpn_to_m_vpn(self.entries.len().saturating_sub(1)) + 1
    }
}

/// Resolves logical pages through the cache, falling back to the global table on a miss.
/// Also owns the per-page validity state, so a remap and its invalidation happen together.
pub struct MappingManager {
    cache: Box<dyn TranslationCache<MappingEntry>>,
    global: GlobalMappingTable,
    oob: OutOfBand,
}

impl MappingManager {
    pub fn new(conf: &Config) -> Result<Self> {
        let geometry = conf.geometry();
        Ok(MappingManager {
            cache: build_cache(conf)?,
            global: GlobalMappingTable::new(geometry, conf.logical_pages()),
            oob: OutOfBand::new(geometry),
        })
    }

    pub fn cache(&self) -> &dyn TranslationCache<MappingEntry> {
        self.cache.as_ref()
    }

    pub fn global(&self) -> &GlobalMappingTable {
        &self.global
    }

    pub fn oob(&self) -> &OutOfBand {
        &self.oob
    }

    /// Never fails: a miss loads the entry, evicting first when the cache is full.
    pub fn lpn_to_ppn(&mut self, lpn: Lpn, rec: &mut Recorder) -> Option<Ppn> {
        if let Some(entry) = self.cache.get(lpn) {
            rec.count_me("cache", "hit");
            return entry.ppn;
        }
        rec.count_me("cache", "miss");

        while !self.cache.has_room_for(lpn) {
            match self.cache.pop_victim() {
                Some((_, victim)) => self.write_back(&victim, rec),
                None => break,
            }
        }

        let entry = self.global.load_entry(lpn);
        rec.count_me("gmt", "load");
        for (_, victim) in self.cache.put(lpn, entry) {
            self.write_back(&victim, rec);
        }
        entry.ppn
    }

    /// Point `lpn` at `ppn`. The previous page, if any, is invalidated. Returns it.
    pub fn update_mapping(&mut self, lpn: Lpn, ppn: Ppn, rec: &mut Recorder) -> Result<Option<Ppn>> {
        let old = self.lpn_to_ppn(lpn, rec);
        if let Some(old) = old {
            self.invalidate_live(lpn, old)?;
        }
        if self.oob.is_valid(ppn) {
            return Err(FtlError::InvariantViolated(format!(
                "ppn {} already holds live data of lpn {:?}",
                ppn,
                self.oob.lpn_of(ppn)
            )));
        }
        self.oob.validate(ppn, lpn);
        self.put_dirty(lpn, Some(ppn), rec);
        trace!("map lpn {} -> ppn {} (was {:?})", lpn, ppn, old);
        Ok(old)
    }

    /// Unmap `lpn`. Returns the page it occupied, `None` if it was not mapped.
    pub fn remove_mapping(&mut self, lpn: Lpn, rec: &mut Recorder) -> Result<Option<Ppn>> {
        let old = match self.lpn_to_ppn(lpn, rec) {
            Some(old) => old,
            None => return Ok(None),
        };
        self.invalidate_live(lpn, old)?;
        self.put_dirty(lpn, None, rec);
        Ok(Some(old))
    }

    /// Forget the pages of an erased block. Live pages must have been moved off first.
    pub fn erase_block(&mut self, block: BlockId) -> Result<()> {
        let live = self.oob.valid_count(block);
        if live != 0 {
            return Err(FtlError::InvariantViolated(format!(
                "erasing block {} with {} valid pages",
                block, live
            )));
        }
        self.oob.erase_block(block);
        Ok(())
    }

    /// Write every dirty cached entry back and empty the cache.
    pub fn flush(&mut self, rec: &mut Recorder) {
        let mut n = 0;
        while let Some((_, entry)) = self.cache.pop_victim() {
            self.write_back(&entry, rec);
            n += 1;
        }
        debug!("flushed {} cached mapping entries", n);
    }

    fn invalidate_live(&mut self, lpn: Lpn, ppn: Ppn) -> Result<()> {
        if !self.oob.is_valid(ppn) || self.oob.lpn_of(ppn) != Some(lpn) {
            return Err(FtlError::InvariantViolated(format!(
                "lpn {} maps to ppn {} but the page is not live for it",
                lpn, ppn
            )));
        }
        self.oob.invalidate(ppn);
        Ok(())
    }

    fn put_dirty(&mut self, lpn: Lpn, ppn: Option<Ppn>, rec: &mut Recorder) {
        let entry = MappingEntry { lpn, ppn, dirty: true };
        for (_, victim) in self.cache.put(lpn, entry) {
            self.write_back(&victim, rec);
        }
    }

    fn write_back(&mut self, entry: &MappingEntry, rec: &mut Recorder) {
        if entry.dirty {
            self.global.store_entry(&MappingEntry { dirty: false, ..*entry });
            rec.count_me("gmt", "store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn manager(cache: CacheConfig) -> MappingManager {
        let conf = Config::with_geometry(4096, 4, 8)
            .with_over_provisioning(0.0)
            .with_cache(cache);
        MappingManager::new(&conf).unwrap()
    }

    #[test]
    fn miss_then_hit() {
        let mut m = manager(CacheConfig::lru(4));
        let mut rec = Recorder::new();
        assert_eq!(m.lpn_to_ppn(3, &mut rec), None);
        assert_eq!(m.lpn_to_ppn(3, &mut rec), None);
        assert_eq!(rec.counter("cache", "miss"), 1);
        assert_eq!(rec.counter("cache", "hit"), 1);
        assert_eq!(rec.counter("gmt", "load"), 1);
    }

    #[test]
    fn overwrite_invalidates_previous_page() {
        let mut m = manager(CacheConfig::lru(4));
        let mut rec = Recorder::new();
        assert_eq!(m.update_mapping(1, 10, &mut rec), Ok(None));
        assert_eq!(m.update_mapping(1, 11, &mut rec), Ok(Some(10)));
        assert!(!m.oob().is_valid(10));
        assert!(m.oob().is_valid(11));
        assert_eq!(m.oob().lpn_of(11), Some(1));
        assert_eq!(m.lpn_to_ppn(1, &mut rec), Some(11));
    }

    #[test]
    fn dirty_eviction_reaches_global_table() {
        let mut m = manager(CacheConfig::lru(2));
        let mut rec = Recorder::new();
        m.update_mapping(0, 0, &mut rec).unwrap();
        m.update_mapping(1, 1, &mut rec).unwrap();
        m.update_mapping(2, 2, &mut rec).unwrap();
        assert_eq!(m.cache().len(), 2);
        assert_eq!(m.global().load_entry(0).ppn, Some(0));
        assert_eq!(rec.counter("gmt", "store"), 1);
        // reload after eviction
        assert_eq!(m.lpn_to_ppn(0, &mut rec), Some(0));
    }

    #[test]
    fn clean_eviction_skips_store() {
        let mut m = manager(CacheConfig::lru(1));
        let mut rec = Recorder::new();
        m.lpn_to_ppn(0, &mut rec);
        m.lpn_to_ppn(1, &mut rec);
        assert_eq!(rec.counter("gmt", "store"), 0);
    }

    #[test]
    fn discard_leaves_tombstone() {
        let mut m = manager(CacheConfig::slru(2, 0.5));
        let mut rec = Recorder::new();
        m.update_mapping(5, 7, &mut rec).unwrap();
        assert_eq!(m.remove_mapping(5, &mut rec), Ok(Some(7)));
        assert_eq!(m.lpn_to_ppn(5, &mut rec), None);
        assert_eq!(m.remove_mapping(5, &mut rec), Ok(None));
        m.flush(&mut rec);
        assert!(m.cache().is_empty());
        assert_eq!(m.global().load_entry(5).ppn, None);
    }

    #[test]
    fn miss_into_cached_group_needs_no_eviction() {
        // room for one group node and two entries
        let mut m = manager(CacheConfig::two_level(16 + 2 * 8));
        let mut rec = Recorder::new();
        m.lpn_to_ppn(0, &mut rec);
        m.lpn_to_ppn(1, &mut rec);
        assert_eq!(m.cache().len(), 2);
        assert!(m.cache().contains(0));
        // a third entry no longer fits
        m.lpn_to_ppn(2, &mut rec);
        assert_eq!(m.cache().len(), 2);
        assert!(!m.cache().contains(0));
    }

    #[test]
    fn flush_persists_everything() {
        let mut m = manager(CacheConfig::two_level(1024));
        let mut rec = Recorder::new();
        for lpn in 0..6 {
            m.update_mapping(lpn, lpn + 8, &mut rec).unwrap();
        }
        m.flush(&mut rec);
        for lpn in 0..6 {
            assert_eq!(m.global().load_entry(lpn).ppn, Some(lpn + 8));
        }
    }

    #[test]
    fn live_page_cannot_be_reused() {
        let mut m = manager(CacheConfig::lru(4));
        let mut rec = Recorder::new();
        m.update_mapping(0, 3, &mut rec).unwrap();
        assert!(matches!(
            m.update_mapping(1, 3, &mut rec),
            Err(FtlError::InvariantViolated(_))
        ));
    }

    #[test]
    fn erase_requires_empty_block() {
        let mut m = manager(CacheConfig::lru(4));
        let mut rec = Recorder::new();
        m.update_mapping(0, 1, &mut rec).unwrap();
        assert!(m.erase_block(0).is_err());
        m.remove_mapping(0, &mut rec).unwrap();
        assert!(m.erase_block(0).is_ok());
    }

    #[test]
    fn translation_page_count() {
        let conf = Config::with_geometry(4096, 64, 16).with_over_provisioning(0.0);
        let gmt = GlobalMappingTable::new(conf.geometry(), conf.logical_pages());
        // 1024 entries, 512 per translation page
        assert_eq!(gmt.total_translation_pages(), 2);
        assert_eq!(gmt.translation_page_of(511), 0);
        assert_eq!(gmt.translation_page_of(512), 1);
    }
}
