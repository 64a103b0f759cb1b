use std::collections::VecDeque;
use std::fs;

use pageserver_common::{Lsn, Page, PageNo, SpaceId, PAGE_SIZE};

use crate::page_cache::CacheKey;

const MIN_CACHED_PAGES: usize = 100;
const DEFAULT_BUDGET_BYTES: usize = 8 * 1024 * 1024 * 1024;
const MEMINFO_FRACTION: f64 = 0.75;

struct Entry {
    data: Box<Page>,
    lsn: Lsn,
}

/// Tier-2: a byte-budgeted LRU sized against observed system memory rather
/// than a fixed page count. Distinct from [`PageCache`](crate::page_cache::PageCache)
/// in eviction unit (bytes, not entries) and in scope (process-wide resident
/// cache shared across all callers of a [`HybridBackend`]).
pub struct LocalFileCache {
    budget_bytes: usize,
    entries: std::sync::Mutex<Inner>,
}

struct Inner {
    map: std::collections::HashMap<CacheKey, Entry>,
    // Front = most recently used.
    order: VecDeque<CacheKey>,
    used_bytes: usize,
}

impl LocalFileCache {
    pub fn new(budget_bytes: usize) -> Self {
        let min_bytes = MIN_CACHED_PAGES * PAGE_SIZE;
        Self {
            budget_bytes: budget_bytes.max(min_bytes),
            entries: std::sync::Mutex::new(Inner {
                map: std::collections::HashMap::new(),
                order: VecDeque::new(),
                used_bytes: 0,
            }),
        }
    }

    /// Size the cache at ~75% of total system memory, as reported by
    /// `/proc/meminfo`. Falls back to a fixed default when the file can't be
    /// read or parsed (non-Linux hosts, containers without procfs).
    pub fn sized_for_system_memory() -> Self {
        let budget = total_memory_bytes()
            .map(|total| (total as f64 * MEMINFO_FRACTION) as usize)
            .unwrap_or(DEFAULT_BUDGET_BYTES);
        Self::new(budget)
    }

    pub fn get(&self, space_id: SpaceId, page_no: PageNo) -> Option<(Box<Page>, Lsn)> {
        let key = CacheKey { space_id, page_no };
        let mut guard = self.entries.lock().unwrap();
        let found = guard.map.get(&key).map(|e| (e.data.clone(), e.lsn));
        if found.is_some() {
            guard.order.retain(|k| k != &key);
            guard.order.push_front(key);
        }
        found
    }

    /// Insert or refresh an entry, evicting least-recently-used entries until
    /// back under budget. Returns the number of entries evicted as a result
    /// of this call (0 if none were needed), so callers can track demotions.
    pub fn put(&self, space_id: SpaceId, page_no: PageNo, lsn: Lsn, data: Page) -> usize {
        let key = CacheKey { space_id, page_no };
        let mut guard = self.entries.lock().unwrap();

        if let Some(existing) = guard.map.get(&key) {
            if existing.lsn > lsn {
                return 0;
            }
            guard.used_bytes -= PAGE_SIZE;
            guard.order.retain(|k| k != &key);
        }

        guard.map.insert(
            key,
            Entry {
                data: Box::new(data),
                lsn,
            },
        );
        guard.order.push_front(key);
        guard.used_bytes += PAGE_SIZE;

        let budget = self.budget_bytes;
        let mut evicted = 0;
        while guard.used_bytes > budget {
            let Some(victim) = guard.order.pop_back() else {
                break;
            };
            if guard.map.remove(&victim).is_some() {
                guard.used_bytes -= PAGE_SIZE;
                evicted += 1;
            }
        }
        evicted
    }

    pub fn invalidate(&self, space_id: SpaceId, page_no: PageNo) {
        let key = CacheKey { space_id, page_no };
        let mut guard = self.entries.lock().unwrap();
        if guard.map.remove(&key).is_some() {
            guard.used_bytes -= PAGE_SIZE;
            guard.order.retain(|k| k != &key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn used_bytes(&self) -> usize {
        self.entries.lock().unwrap().used_bytes
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }
}

fn total_memory_bytes() -> Option<u64> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
