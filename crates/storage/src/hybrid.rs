use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pageserver_common::{Lsn, Page, PageNo, PageServerError, SpaceId, StorageBackend};
use pageserver_pagestore::LocalFileCache;

/// Snapshot of Tier-2/Tier-3 traffic counters, for the metrics surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridMetrics {
    pub lfc_hits: u64,
    pub lfc_misses: u64,
    pub tier3_hits: u64,
    pub promotions: u64,
    /// Entries evicted out of the Tier-2 cache under byte-budget pressure.
    pub demotions: u64,
}

/// Composes the Tier-2 local file cache in front of a durable Tier-3 backend
/// (file or S3). The Tier-1 in-memory cache lives above this, in
/// `CoreService`, and is not part of this type — `HybridBackend` only
/// implements `StorageBackend` so it's interchangeable with a bare
/// `FileBackend`/`S3Backend` wherever one is expected.
pub struct HybridBackend {
    lfc: LocalFileCache,
    tier3: Box<dyn StorageBackend>,
    lfc_hits: AtomicU64,
    lfc_misses: AtomicU64,
    tier3_hits: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
}

impl HybridBackend {
    pub fn new(lfc: LocalFileCache, tier3: Box<dyn StorageBackend>) -> Self {
        Self {
            lfc,
            tier3,
            lfc_hits: AtomicU64::new(0),
            lfc_misses: AtomicU64::new(0),
            tier3_hits: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
        }
    }

    pub fn metrics(&self) -> HybridMetrics {
        HybridMetrics {
            lfc_hits: self.lfc_hits.load(Ordering::Relaxed),
            lfc_misses: self.lfc_misses.load(Ordering::Relaxed),
            tier3_hits: self.tier3_hits.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl StorageBackend for HybridBackend {
    async fn load_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        requested_lsn: Lsn,
    ) -> Result<(Page, Lsn), PageServerError> {
        if let Some((data, lsn)) = self.lfc.get(space_id, page_no) {
            if lsn <= requested_lsn {
                self.lfc_hits.fetch_add(1, Ordering::Relaxed);
                return Ok((*data, lsn));
            }
        }
        self.lfc_misses.fetch_add(1, Ordering::Relaxed);

        let (page, lsn) = self.tier3.load_page(space_id, page_no, requested_lsn).await?;
        self.tier3_hits.fetch_add(1, Ordering::Relaxed);
        self.promotions.fetch_add(1, Ordering::Relaxed);
        let evicted = self.lfc.put(space_id, page_no, lsn, page);
        self.demotions.fetch_add(evicted as u64, Ordering::Relaxed);
        Ok((page, lsn))
    }

    async fn store_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        lsn: Lsn,
        bytes: Page,
    ) -> Result<(), PageServerError> {
        self.tier3.store_page(space_id, page_no, lsn, bytes).await?;
        let evicted = self.lfc.put(space_id, page_no, lsn, bytes);
        self.demotions.fetch_add(evicted as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn store_wal(&self, lsn: Lsn, bytes: Vec<u8>) -> Result<(), PageServerError> {
        self.tier3.store_wal(lsn, bytes).await
    }

    async fn latest_lsn(&self) -> Lsn {
        self.tier3.latest_lsn().await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
