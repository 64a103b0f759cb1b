use std::num::NonZeroUsize;

use lru::LruCache;
use pageserver_common::{Lsn, Page, PageNo, SpaceId};

/// Key for the Tier-1 page cache: one physical page, independent of version.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub space_id: SpaceId,
    pub page_no: PageNo,
}

struct Entry {
    data: Box<Page>,
    lsn: Lsn,
}

/// Result of a Tier-1 lookup against a requested LSN.
///
/// A plain `Option<Page>` can't distinguish "not cached" from "cached, but
/// the cached version is newer than what the caller asked for" — the latter
/// must fall through to Tier-2/Tier-3 rather than be treated as a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit { data: Box<Page>, lsn: Lsn },
    StaleForTarget { cached_lsn: Lsn },
    Absent,
}

/// Tier-1: a bounded in-memory LRU holding the single most recent version of
/// each page seen. Exact, deterministic eviction (oldest-last-access first),
/// not approximate — callers rely on this for testable eviction order.
pub struct PageCache {
    inner: std::sync::Mutex<LruCache<CacheKey, Entry>>,
}

impl PageCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            inner: std::sync::Mutex::new(LruCache::new(cap)),
        }
    }

    /// Look up a page, respecting the "greatest stored LSN <= requested_lsn"
    /// read semantics. Only the most recent version per page is cached, so
    /// if that version is newer than `requested_lsn` it cannot answer the
    /// request and the caller must fall through to a lower tier.
    pub fn get(&self, space_id: SpaceId, page_no: PageNo, requested_lsn: Lsn) -> CacheLookup {
        let key = CacheKey { space_id, page_no };
        let mut guard = self.inner.lock().unwrap();
        match guard.get(&key) {
            Some(entry) if entry.lsn <= requested_lsn => CacheLookup::Hit {
                data: entry.data.clone(),
                lsn: entry.lsn,
            },
            Some(entry) => CacheLookup::StaleForTarget {
                cached_lsn: entry.lsn,
            },
            None => CacheLookup::Absent,
        }
    }

    /// Insert or replace the cached version of a page. Callers only ever
    /// cache the page version they just produced from the freshest read, so
    /// an older write can't silently regress a newer cached entry.
    pub fn put(&self, space_id: SpaceId, page_no: PageNo, lsn: Lsn, data: Page) {
        let key = CacheKey { space_id, page_no };
        let mut guard = self.inner.lock().unwrap();
        if let Some(existing) = guard.peek(&key) {
            if existing.lsn > lsn {
                return;
            }
        }
        guard.put(
            key,
            Entry {
                data: Box::new(data),
                lsn,
            },
        );
    }

    pub fn invalidate(&self, space_id: SpaceId, page_no: PageNo) {
        let key = CacheKey { space_id, page_no };
        self.inner.lock().unwrap().pop(&key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageserver_common::empty_page;

    fn sp(id: u32) -> SpaceId {
        SpaceId(id)
    }
    fn pg(no: u32) -> PageNo {
        PageNo(no)
    }

    #[test]
    fn miss_on_empty_cache() {
        let cache = PageCache::new(4);
        assert_eq!(cache.get(sp(1), pg(1), 10), CacheLookup::Absent);
    }

    #[test]
    fn hit_at_or_below_requested_lsn() {
        let cache = PageCache::new(4);
        let mut page = empty_page();
        page[0] = 0xAB;
        cache.put(sp(1), pg(1), 5, page);

        match cache.get(sp(1), pg(1), 5) {
            CacheLookup::Hit { lsn, .. } => assert_eq!(lsn, 5),
            other => panic!("expected hit, got {other:?}"),
        }
        match cache.get(sp(1), pg(1), 10) {
            CacheLookup::Hit { lsn, .. } => assert_eq!(lsn, 5),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn stale_when_cached_version_is_newer_than_requested() {
        let cache = PageCache::new(4);
        cache.put(sp(1), pg(1), 20, empty_page());
        match cache.get(sp(1), pg(1), 5) {
            CacheLookup::StaleForTarget { cached_lsn } => assert_eq!(cached_lsn, 20),
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn put_does_not_regress_a_newer_entry() {
        let cache = PageCache::new(4);
        let mut newer = empty_page();
        newer[0] = 0x02;
        cache.put(sp(1), pg(1), 20, newer);

        let mut older = empty_page();
        older[0] = 0x01;
        cache.put(sp(1), pg(1), 10, older);

        match cache.get(sp(1), pg(1), 20) {
            CacheLookup::Hit { data, lsn } => {
                assert_eq!(lsn, 20);
                assert_eq!(data[0], 0x02);
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn eviction_is_oldest_last_access_first() {
        let cache = PageCache::new(2);
        cache.put(sp(1), pg(1), 1, empty_page());
        cache.put(sp(2), pg(1), 1, empty_page());
        // touch (1,1) so (2,1) becomes the least-recently-used entry
        let _ = cache.get(sp(1), pg(1), 1);
        cache.put(sp(3), pg(1), 1, empty_page());

        assert_eq!(cache.get(sp(2), pg(1), 1), CacheLookup::Absent);
        assert!(matches!(
            cache.get(sp(1), pg(1), 1),
            CacheLookup::Hit { .. }
        ));
        assert!(matches!(
            cache.get(sp(3), pg(1), 1),
            CacheLookup::Hit { .. }
        ));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = PageCache::new(4);
        cache.put(sp(1), pg(1), 1, empty_page());
        cache.invalidate(sp(1), pg(1));
        assert_eq!(cache.get(sp(1), pg(1), 1), CacheLookup::Absent);
    }
}
