use std::sync::Arc;

use pageserver::config::{Config, StorageKind};
use pageserver::{CoreService, PageRequest};
use pageserver_common::{PageNo, SpaceId, StorageBackend};
use pageserver_pagestore::{PageCache, SnapshotIndex};
use pageserver_storage::{FileBackend, HybridBackend, S3Backend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::from_args(&args[1..]).map_err(anyhow::Error::msg)?;

    let backend = build_backend(&config).await?;
    let tier1 = Arc::new(PageCache::new(config.cache_entries));
    let snapshots = SnapshotIndex::open(&config.data_dir)?;
    let service = CoreService::new(backend, tier1, snapshots);

    run_demo(&service).await
}

async fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage {
        StorageKind::File => {
            let backend = FileBackend::open(&config.data_dir).await?;
            Ok(Arc::new(backend))
        }
        StorageKind::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .expect("validated present in Config::from_args");
            let backend = match &config.s3_endpoint {
                Some(endpoint) => {
                    S3Backend::with_endpoint(bucket, config.s3_prefix.clone(), endpoint.clone()).await
                }
                None => S3Backend::new(bucket, config.s3_prefix.clone()).await,
            };
            Ok(Arc::new(backend))
        }
        StorageKind::Hybrid => {
            let bucket = config
                .s3_bucket
                .clone()
                .expect("validated present in Config::from_args");
            let tier3: Box<dyn StorageBackend> = match &config.s3_endpoint {
                Some(endpoint) => Box::new(
                    S3Backend::with_endpoint(bucket, config.s3_prefix.clone(), endpoint.clone()).await,
                ),
                None => Box::new(S3Backend::new(bucket, config.s3_prefix.clone()).await),
            };
            let lfc = pageserver_pagestore::LocalFileCache::sized_for_system_memory();
            Ok(Arc::new(HybridBackend::new(lfc, tier3)))
        }
    }
}

/// A single WRITE record against (space 1, page 1) writing "Hello, DB!" at
/// offset 0, kept short enough to fit the inline-length nibble (max 15
/// bytes total). Exercises ingest -> read end to end without a real WAL
/// source.
fn encode_demo_write() -> Vec<u8> {
    let payload: &[u8] = b"Hello, DB!";
    let mut body = vec![1u8, 1u8, 0u8]; // space_id, page_no, offset delta
    body.extend_from_slice(payload);

    let total_len = (1 + body.len()) as u8; // + header byte
    let header = 0x30 | total_len; // TYPE_WRITE, not same_page, inline length
    let mut record = vec![header];
    record.extend(body);
    record
}

async fn run_demo(service: &CoreService) -> anyhow::Result<()> {
    println!("=== page server demo ===\n");

    let wal_bytes = encode_demo_write();
    let report = service.stream_wal(1, wal_bytes).await?;
    println!(
        "ingested WAL chunk at lsn=1: {} record(s) applied, {} error(s)",
        report.records_applied,
        report.record_errors.len()
    );

    let (page, lsn) = service.get_page(SpaceId(1), PageNo(1), 1).await?;
    let text_len = b"Hello, DB!".len();
    println!(
        "page (1,1) at lsn={lsn}: {:?}",
        String::from_utf8_lossy(&page[0..text_len])
    );

    let batch = service
        .get_pages(vec![
            PageRequest { space_id: SpaceId(1), page_no: PageNo(1), lsn: 1 },
            PageRequest { space_id: SpaceId(1), page_no: PageNo(2), lsn: 1 },
        ])
        .await?;
    println!("batch status: {:?}", batch.status);

    service.create_snapshot(1, "after-demo-write").await?;
    println!("snapshots: {:?}", service.list_snapshots()?);

    let metrics = service.metrics().await;
    println!(
        "metrics: tier1_entries={} latest_lsn={}",
        metrics.tier1_entries, metrics.latest_lsn
    );

    Ok(())
}
