//! Composition root. `CoreService` wires together a durable backend, the
//! Tier-1 page cache, WAL ingestion, and snapshot bookkeeping into the one
//! object the binary (or an embedding test) talks to.

pub mod config;

use std::sync::Arc;

use pageserver_common::{Lsn, Page, PageNo, PageServerError, SpaceId, StorageBackend};
use pageserver_pagestore::{PageCache, SnapshotIndex};
use pageserver_storage::{HybridBackend, IngestReport, WalProcessor};

pub use config::{Config, StorageKind};

/// One page request inside a batch `get_pages` call.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub space_id: SpaceId,
    pub page_no: PageNo,
    pub lsn: Lsn,
}

/// Outcome of one page within a batch request.
pub enum PageResult {
    Found { data: Page, lsn: Lsn },
    NotFound,
}

/// Outcome of a whole `get_pages` call: "success" only if every page in the
/// batch resolved; "partial" if at least one request missed, so the caller
/// can tell a fully-failed batch from a mostly-successful one without
/// inspecting every element.
pub struct BatchResult {
    pub status: BatchStatus,
    pub pages: Vec<PageResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Success,
    Partial,
}

/// Batches larger than this are rejected outright rather than silently
/// truncated.
pub const MAX_BATCH_SIZE: usize = 1000;

pub struct CoreService {
    backend: Arc<dyn StorageBackend>,
    tier1: Arc<PageCache>,
    wal: WalProcessor,
    snapshots: SnapshotIndex,
}

impl CoreService {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        tier1: Arc<PageCache>,
        snapshots: SnapshotIndex,
    ) -> Self {
        let wal = WalProcessor::new(backend.clone(), tier1.clone());
        Self {
            backend,
            tier1,
            wal,
            snapshots,
        }
    }

    /// Read a page at the greatest stored LSN <= `lsn`, checking Tier-1
    /// before falling through to the backend (which may itself be a
    /// `HybridBackend` composing Tier-2/Tier-3).
    pub async fn get_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        lsn: Lsn,
    ) -> Result<(Page, Lsn), PageServerError> {
        use pageserver_pagestore::CacheLookup;

        match self.tier1.get(space_id, page_no, lsn) {
            CacheLookup::Hit { data, lsn } => return Ok((*data, lsn)),
            CacheLookup::StaleForTarget { .. } | CacheLookup::Absent => {}
        }

        let (page, resolved_lsn) = self.backend.load_page(space_id, page_no, lsn).await?;
        self.tier1.put(space_id, page_no, resolved_lsn, page);
        Ok((page, resolved_lsn))
    }

    /// Read many pages in one call. Capped at `MAX_BATCH_SIZE` so one
    /// request can't force unbounded concurrent backend I/O.
    pub async fn get_pages(
        &self,
        requests: Vec<PageRequest>,
    ) -> Result<BatchResult, PageServerError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(PageServerError::MalformedInput(format!(
                "batch of {} exceeds max size {}",
                requests.len(),
                MAX_BATCH_SIZE
            )));
        }

        let futures = requests.into_iter().map(|req| async move {
            match self.get_page(req.space_id, req.page_no, req.lsn).await {
                Ok((data, lsn)) => PageResult::Found { data, lsn },
                Err(_) => PageResult::NotFound,
            }
        });
        let pages = futures::future::join_all(futures).await;

        let status = if pages.iter().all(|p| matches!(p, PageResult::Found { .. })) {
            BatchStatus::Success
        } else {
            BatchStatus::Partial
        };

        Ok(BatchResult { status, pages })
    }

    /// Ingest one WAL chunk, applying its records and publishing the
    /// resulting page versions.
    pub async fn stream_wal(&self, lsn: Lsn, bytes: Vec<u8>) -> Result<IngestReport, PageServerError> {
        self.wal.ingest(lsn, bytes).await
    }

    /// Read a page as of an arbitrary historical LSN, bypassing Tier-1 only
    /// (time travel reads a specific past version, which Tier-1 doesn't
    /// retain — it only ever holds the newest version per page — so this
    /// always falls through to the backend, but still benefits from
    /// Tier-2/Tier-3 inside a `HybridBackend`).
    pub async fn time_travel(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        lsn: Lsn,
    ) -> Result<(Page, Lsn), PageServerError> {
        self.backend.load_page(space_id, page_no, lsn).await
    }

    /// Mint a snapshot at `lsn`, substituting the backend's current
    /// `latest_lsn()` when `lsn == 0` so `create_snapshot(0, "t0")` bookmarks
    /// "now" rather than literally LSN 0.
    pub async fn create_snapshot(
        &self,
        lsn: Lsn,
        description: &str,
    ) -> Result<pageserver_pagestore::Snapshot, PageServerError> {
        let lsn = if lsn == 0 {
            self.backend.latest_lsn().await
        } else {
            lsn
        };
        self.snapshots.create(lsn, description)
    }

    pub fn list_snapshots(&self) -> Result<Vec<pageserver_pagestore::Snapshot>, PageServerError> {
        self.snapshots.list()
    }

    pub fn get_snapshot(
        &self,
        id: &str,
    ) -> Result<Option<pageserver_pagestore::Snapshot>, PageServerError> {
        self.snapshots.get(id)
    }

    /// Restore is just resolving the snapshot's LSN: a read at that LSN
    /// replays the same greatest-LSN-<=-target rule used everywhere else,
    /// so there's no separate data copy to perform.
    pub async fn restore_snapshot(
        &self,
        id: &str,
        space_id: SpaceId,
        page_no: PageNo,
    ) -> Result<(Page, Lsn), PageServerError> {
        let snapshot = self.snapshots.get(id)?.ok_or(PageServerError::NotFound)?;
        self.time_travel(space_id, page_no, snapshot.lsn).await
    }

    /// Tier-1 size and the backend's durable watermark always apply; the
    /// Tier-2/Tier-3 counters only exist when the backend is a
    /// `HybridBackend`, reached here via `as_any` since `CoreService` only
    /// holds `Arc<dyn StorageBackend>`.
    pub async fn metrics(&self) -> ServiceMetrics {
        let hybrid = self.backend.as_any().downcast_ref::<HybridBackend>().map(|h| h.metrics());
        ServiceMetrics {
            tier1_entries: self.tier1.len(),
            latest_lsn: self.backend.latest_lsn().await,
            lfc_hits: hybrid.map(|m| m.lfc_hits).unwrap_or(0),
            lfc_misses: hybrid.map(|m| m.lfc_misses).unwrap_or(0),
            tier3_hits: hybrid.map(|m| m.tier3_hits).unwrap_or(0),
            promotions: hybrid.map(|m| m.promotions).unwrap_or(0),
            demotions: hybrid.map(|m| m.demotions).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceMetrics {
    pub tier1_entries: usize,
    pub latest_lsn: Lsn,
    pub lfc_hits: u64,
    pub lfc_misses: u64,
    pub tier3_hits: u64,
    pub promotions: u64,
    pub demotions: u64,
}
