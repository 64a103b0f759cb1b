use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use pageserver_common::{Lsn, Page, PageNo, PageServerError, SpaceId, StorageBackend};

/// Durable Tier-3 backend storing page versions and WAL chunks as objects in
/// an S3-compatible bucket. Supports a custom endpoint so tests can point it
/// at a local MinIO instance instead of real S3.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
    latest_lsn: AtomicU64,
}

impl S3Backend {
    pub async fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            latest_lsn: AtomicU64::new(0),
        }
    }

    /// Build a backend against a custom endpoint (e.g. MinIO for tests),
    /// with path-style addressing since most S3-compatible test servers
    /// don't support virtual-hosted buckets.
    pub async fn with_endpoint(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        endpoint_url: impl Into<String>,
    ) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            latest_lsn: AtomicU64::new(0),
        }
    }

    fn page_key(&self, space_id: SpaceId, page_no: PageNo, lsn: Lsn) -> String {
        format!("{}pages/space_{}/page_{}_{}", self.prefix, space_id.0, page_no.0, lsn)
    }

    fn page_prefix(&self, space_id: SpaceId, page_no: PageNo) -> String {
        format!("{}pages/space_{}/page_{}_", self.prefix, space_id.0, page_no.0)
    }

    fn wal_key(&self, lsn: Lsn) -> String {
        format!("{}wal/wal_{}", self.prefix, lsn)
    }

    /// List all stored version LSNs for a page and return the greatest one
    /// that is `<= ceiling`.
    async fn highest_version_at_or_below(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        ceiling: Lsn,
    ) -> Result<Option<Lsn>, PageServerError> {
        let prefix = self.page_prefix(space_id, page_no);
        let mut best: Option<Lsn> = None;
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| PageServerError::Storage(e.to_string()))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                let Some(suffix) = key.strip_prefix(&prefix) else {
                    continue;
                };
                let Ok(lsn) = suffix.parse::<Lsn>() else {
                    continue;
                };
                if lsn <= ceiling && best.map(|b| lsn > b).unwrap_or(true) {
                    best = Some(lsn);
                }
            }

            if response.is_truncated().unwrap_or(false) {
                continuation = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(best)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn load_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        requested_lsn: Lsn,
    ) -> Result<(Page, Lsn), PageServerError> {
        let Some(lsn) = self
            .highest_version_at_or_below(space_id, page_no, requested_lsn)
            .await?
        else {
            return Err(PageServerError::NotFound);
        };

        let key = self.page_key(space_id, page_no, lsn);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| PageServerError::Storage(e.to_string()))?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| PageServerError::Storage(e.to_string()))?
            .into_bytes();

        let page: Page = bytes
            .as_ref()
            .try_into()
            .map_err(|_| PageServerError::Storage("stored page has wrong size".into()))?;
        Ok((page, lsn))
    }

    async fn store_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        lsn: Lsn,
        bytes: Page,
    ) -> Result<(), PageServerError> {
        let key = self.page_key(space_id, page_no, lsn);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(bytes.to_vec().into())
            .send()
            .await
            .map_err(|e| PageServerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn store_wal(&self, lsn: Lsn, bytes: Vec<u8>) -> Result<(), PageServerError> {
        let key = self.wal_key(lsn);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(bytes.into())
            .send()
            .await
            .map_err(|e| PageServerError::Storage(e.to_string()))?;
        self.latest_lsn.fetch_max(lsn, Ordering::SeqCst);
        Ok(())
    }

    async fn latest_lsn(&self) -> Lsn {
        self.latest_lsn.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
