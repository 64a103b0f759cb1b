use std::sync::Arc;

use pageserver::{BatchStatus, CoreService, PageRequest};
use pageserver_common::{PageNo, SpaceId, StorageBackend};
use pageserver_pagestore::{LocalFileCache, PageCache, SnapshotIndex};
use pageserver_storage::{FileBackend, HybridBackend};
use tempfile::TempDir;

fn header(type_code: u8, inline_len: u8) -> u8 {
    type_code | inline_len
}

const TYPE_WRITE: u8 = 0x30;

fn encode_write(space_id: u8, page_no: u8, offset_delta: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = vec![header(TYPE_WRITE, 0)];
    buf.push(space_id);
    buf.push(page_no);
    buf.push(offset_delta);
    buf.extend_from_slice(data);
    let total_len = buf.len() as u8;
    buf[0] = header(TYPE_WRITE, total_len);
    buf
}

async fn new_service(dir: &TempDir) -> CoreService {
    let backend = FileBackend::open(dir.path()).await.unwrap();
    let tier1 = Arc::new(PageCache::new(64));
    let snapshots = SnapshotIndex::open(dir.path()).unwrap();
    CoreService::new(Arc::new(backend), tier1, snapshots)
}

#[tokio::test]
async fn fresh_write_is_readable() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    let bytes = encode_write(1, 1, 0, b"fresh-data");
    service.stream_wal(1, bytes).await.unwrap();

    let (page, lsn) = service.get_page(SpaceId(1), PageNo(1), 1).await.unwrap();
    assert_eq!(lsn, 1);
    assert_eq!(&page[0..10], b"fresh-data");
}

#[tokio::test]
async fn history_is_preserved_for_time_travel() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    service
        .stream_wal(1, encode_write(1, 1, 0, b"version-1!"))
        .await
        .unwrap();
    service
        .stream_wal(2, encode_write(1, 1, 0, b"version-2!"))
        .await
        .unwrap();

    let (old_page, old_lsn) = service.time_travel(SpaceId(1), PageNo(1), 1).await.unwrap();
    assert_eq!(old_lsn, 1);
    assert_eq!(&old_page[0..10], b"version-1!");

    let (new_page, new_lsn) = service.get_page(SpaceId(1), PageNo(1), 2).await.unwrap();
    assert_eq!(new_lsn, 2);
    assert_eq!(&new_page[0..10], b"version-2!");
}

#[tokio::test]
async fn reading_at_an_lsn_before_any_version_exists_misses() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    service
        .stream_wal(5, encode_write(1, 1, 0, b"later-data"))
        .await
        .unwrap();

    let result = service.get_page(SpaceId(1), PageNo(1), 3).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn batch_reports_partial_when_some_pages_are_missing() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    service
        .stream_wal(1, encode_write(1, 1, 0, b"exists----"))
        .await
        .unwrap();

    let batch = service
        .get_pages(vec![
            PageRequest { space_id: SpaceId(1), page_no: PageNo(1), lsn: 1 },
            PageRequest { space_id: SpaceId(1), page_no: PageNo(99), lsn: 1 },
        ])
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Partial);
}

#[tokio::test]
async fn batch_reports_success_when_all_pages_resolve() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    service
        .stream_wal(1, encode_write(1, 1, 0, b"page-one--"))
        .await
        .unwrap();
    service
        .stream_wal(2, encode_write(1, 2, 0, b"page-two--"))
        .await
        .unwrap();

    let batch = service
        .get_pages(vec![
            PageRequest { space_id: SpaceId(1), page_no: PageNo(1), lsn: 2 },
            PageRequest { space_id: SpaceId(1), page_no: PageNo(2), lsn: 2 },
        ])
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Success);
}

#[tokio::test]
async fn snapshot_resolves_to_the_lsn_it_bookmarked() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    service
        .stream_wal(1, encode_write(1, 1, 0, b"before-up!"))
        .await
        .unwrap();
    let snapshot = service.create_snapshot(1, "checkpoint").await.unwrap();

    service
        .stream_wal(2, encode_write(1, 1, 0, b"after-upd!"))
        .await
        .unwrap();

    let (page, lsn) = service
        .restore_snapshot(&snapshot.id, SpaceId(1), PageNo(1))
        .await
        .unwrap();
    assert_eq!(lsn, 1);
    assert_eq!(&page[0..10], b"before-up!");
}

#[tokio::test]
async fn snapshot_at_lsn_zero_bookmarks_the_current_latest_lsn() {
    let dir = TempDir::new().unwrap();
    let service = new_service(&dir).await;

    service
        .stream_wal(1, encode_write(1, 7, 0, b"v1--------"))
        .await
        .unwrap();
    service
        .stream_wal(200, encode_write(1, 7, 0, b"v200------"))
        .await
        .unwrap();

    let snapshot = service.create_snapshot(0, "t0").await.unwrap();
    assert_eq!(snapshot.lsn, 200);

    service
        .stream_wal(300, encode_write(1, 7, 0, b"v300------"))
        .await
        .unwrap();

    let (page, lsn) = service
        .restore_snapshot(&snapshot.id, SpaceId(1), PageNo(7))
        .await
        .unwrap();
    assert_eq!(lsn, 200);
    assert_eq!(&page[0..10], b"v200------");
}

#[tokio::test]
async fn local_file_cache_evicts_under_a_small_byte_budget() {
    let dir = TempDir::new().unwrap();
    let file_backend = FileBackend::open(dir.path()).await.unwrap();
    let lfc_budget = 100 * pageserver_common::PAGE_SIZE;
    let lfc = LocalFileCache::new(lfc_budget);
    let hybrid = HybridBackend::new(lfc, Box::new(file_backend));

    for i in 1..=120u32 {
        hybrid
            .store_page(SpaceId(1), PageNo(i), 1, pageserver_common::empty_page())
            .await
            .unwrap();
    }

    // The most recently stored pages should still be resident; the
    // earliest ones were evicted to stay under budget. Either way a
    // lookup always succeeds by falling through to tier-3.
    let (_, lsn) = hybrid.load_page(SpaceId(1), PageNo(120), 1).await.unwrap();
    assert_eq!(lsn, 1);
    let (_, lsn) = hybrid.load_page(SpaceId(1), PageNo(1), 1).await.unwrap();
    assert_eq!(lsn, 1);
}

#[tokio::test]
async fn service_metrics_surface_hybrid_backend_counters() {
    let dir = TempDir::new().unwrap();

    {
        let file_backend = FileBackend::open(dir.path()).await.unwrap();
        let lfc = LocalFileCache::new(100 * pageserver_common::PAGE_SIZE);
        let backend: Arc<dyn StorageBackend> = Arc::new(HybridBackend::new(lfc, Box::new(file_backend)));
        let tier1 = Arc::new(PageCache::new(64));
        let snapshots = SnapshotIndex::open(dir.path()).unwrap();
        let service = CoreService::new(backend, tier1, snapshots);
        service
            .stream_wal(1, encode_write(1, 1, 0, b"hybrid-one"))
            .await
            .unwrap();
    }

    // Fresh HybridBackend over the same tier-3 directory, so its LFC starts
    // cold and the read below is guaranteed to miss Tier-2 before hitting
    // Tier-3.
    let file_backend = FileBackend::open(dir.path()).await.unwrap();
    let lfc = LocalFileCache::new(100 * pageserver_common::PAGE_SIZE);
    let backend: Arc<dyn StorageBackend> = Arc::new(HybridBackend::new(lfc, Box::new(file_backend)));
    let tier1 = Arc::new(PageCache::new(64));
    let snapshots = SnapshotIndex::open(dir.path()).unwrap();
    let service = CoreService::new(backend, tier1, snapshots);

    service.time_travel(SpaceId(1), PageNo(1), 1).await.unwrap();

    let metrics = service.metrics().await;
    assert_eq!(metrics.lfc_misses, 1);
    assert_eq!(metrics.tier3_hits, 1);
    assert_eq!(metrics.promotions, 1);
}
