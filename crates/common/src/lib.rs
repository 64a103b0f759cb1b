use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Core identifiers
// ---------------------------------------------------------------------------

/// Log sequence number. Monotonically increasing across the process
/// lifetime; 0 is used as a sentinel ("no LSN yet").
pub type Lsn = u64;

/// Tablespace identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub u32);

/// Page number within a tablespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageNo(pub u32);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one physical page, independent of version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub space_id: SpaceId,
    pub page_no: PageNo,
}

impl PageKey {
    pub fn new(space_id: SpaceId, page_no: PageNo) -> Self {
        Self { space_id, page_no }
    }
}

/// Fixed-size page image — matches InnoDB's default page size.
pub const PAGE_SIZE: usize = 16384;

pub type Page = [u8; PAGE_SIZE];

/// A zeroed page (the implicit "page doesn't exist yet" state).
pub fn empty_page() -> Page {
    [0u8; PAGE_SIZE]
}

/// Stamp a page's first 8 bytes with its LSN, little-endian, as every stored
/// version requires.
pub fn stamp_lsn(page: &mut Page, lsn: Lsn) {
    page[0..8].copy_from_slice(&lsn.to_le_bytes());
}

/// Read back the LSN stamped at the front of a page buffer.
pub fn read_stamped_lsn(page: &Page) -> Lsn {
    u64::from_le_bytes(page[0..8].try_into().unwrap())
}

// ---------------------------------------------------------------------------
// StorageBackend — the capability shared by File / S3 / Hybrid
// ---------------------------------------------------------------------------

/// The three storage backends (File, S3, Hybrid) are polymorphic over this
/// capability set. Hybrid composes the other two as inner values rather than
/// through inheritance.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Load the page version with the greatest stored LSN <= `requested_lsn`.
    async fn load_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        requested_lsn: Lsn,
    ) -> Result<(Page, Lsn), PageServerError>;

    /// Persist a new page version. Idempotent on an identical
    /// `(space_id, page_no, lsn)` re-write.
    async fn store_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        lsn: Lsn,
        bytes: Page,
    ) -> Result<(), PageServerError>;

    /// Persist a raw WAL chunk for durability and future replay.
    async fn store_wal(&self, lsn: Lsn, bytes: Vec<u8>) -> Result<(), PageServerError>;

    /// Maximum LSN ever durably stored by this backend.
    async fn latest_lsn(&self) -> Lsn;

    /// Narrows back to the concrete backend type. Lets callers holding only
    /// `Arc<dyn StorageBackend>` reach backend-specific stats (e.g. Tier-2/
    /// Tier-3 counters on `HybridBackend`) without the trait itself knowing
    /// about them.
    fn as_any(&self) -> &dyn std::any::Any;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PageServerError {
    #[error("no page version <= requested LSN")]
    NotFound,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("redo-log parse error: {0}")]
    Parse(String),

    #[error("page apply error: {0}")]
    Apply(String),

    #[error("storage I/O error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for PageServerError {
    fn from(e: std::io::Error) -> Self {
        PageServerError::Storage(e.to_string())
    }
}
