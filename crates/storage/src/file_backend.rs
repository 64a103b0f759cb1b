use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use pageserver_common::{Lsn, Page, PageNo, PageServerError, SpaceId, StorageBackend};

/// Durable Tier-3 backend storing each page version as its own file on a
/// local (or network-mounted) filesystem.
///
/// Layout:
///   <data_dir>/pages/space_<id>/page_<no>_<lsn>
///   <data_dir>/pages/space_<id>/page_<no>_latest   (pointer: decimal LSN)
///   <data_dir>/wal/wal_<lsn>
///
/// All writes land through a temp file + rename so a reader never observes a
/// partially written version.
pub struct FileBackend {
    data_dir: PathBuf,
    latest_lsn: AtomicU64,
}

impl FileBackend {
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, PageServerError> {
        let data_dir = data_dir.into();
        let wal_dir = data_dir.join("wal");
        let pages_dir = data_dir.join("pages");

        let latest = {
            let wal_dir = wal_dir.clone();
            tokio::task::spawn_blocking(move || -> Result<Lsn, PageServerError> {
                std::fs::create_dir_all(&wal_dir)?;
                Ok(highest_lsn_in_dir(&wal_dir, "wal_")?)
            })
            .await
            .map_err(|e| PageServerError::Storage(e.to_string()))??
        };

        tokio::task::spawn_blocking(move || std::fs::create_dir_all(&pages_dir))
            .await
            .map_err(|e| PageServerError::Storage(e.to_string()))??;

        Ok(Self {
            data_dir,
            latest_lsn: AtomicU64::new(latest),
        })
    }

    fn space_dir(&self, space_id: SpaceId) -> PathBuf {
        self.data_dir.join("pages").join(format!("space_{}", space_id.0))
    }

    fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn load_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        requested_lsn: Lsn,
    ) -> Result<(Page, Lsn), PageServerError> {
        let dir = self.space_dir(space_id);
        tokio::task::spawn_blocking(move || {
            let prefix = format!("page_{}_", page_no.0);
            let chosen = highest_matching_version(&dir, &prefix, requested_lsn)?;
            let Some(lsn) = chosen else {
                return Err(PageServerError::NotFound);
            };
            let bytes = std::fs::read(dir.join(format!("{prefix}{lsn}")))?;
            let page: Page = bytes
                .try_into()
                .map_err(|_| PageServerError::Storage("stored page has wrong size".into()))?;
            Ok((page, lsn))
        })
        .await
        .map_err(|e| PageServerError::Storage(e.to_string()))?
    }

    async fn store_page(
        &self,
        space_id: SpaceId,
        page_no: PageNo,
        lsn: Lsn,
        bytes: Page,
    ) -> Result<(), PageServerError> {
        let dir = self.space_dir(space_id);
        tokio::task::spawn_blocking(move || -> Result<(), PageServerError> {
            std::fs::create_dir_all(&dir)?;
            let final_path = dir.join(format!("page_{}_{}", page_no.0, lsn));
            atomic_write(&final_path, &bytes)?;

            let pointer_path = dir.join(format!("page_{}_latest", page_no.0));
            atomic_write(&pointer_path, lsn.to_string().as_bytes())?;
            Ok(())
        })
        .await
        .map_err(|e| PageServerError::Storage(e.to_string()))?
    }

    async fn store_wal(&self, lsn: Lsn, bytes: Vec<u8>) -> Result<(), PageServerError> {
        let dir = self.wal_dir();
        tokio::task::spawn_blocking(move || -> Result<(), PageServerError> {
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(format!("wal_{lsn}"));
            atomic_write(&path, &bytes)?;
            Ok(())
        })
        .await
        .map_err(|e| PageServerError::Storage(e.to_string()))??;

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

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Scan `dir` for files named `<prefix><lsn>` and return the greatest `lsn`
/// found, or 0 if the directory has no such files yet.
fn highest_lsn_in_dir(dir: &Path, prefix: &str) -> std::io::Result<Lsn> {
    Ok(highest_matching_version(dir, prefix, u64::MAX)?.unwrap_or(0))
}

/// Scan `dir` for files named `<prefix><lsn>` and return the greatest `lsn`
/// that is `<= ceiling`, if any. Pointer files (`..._latest`) and anything
/// not matching `<prefix><digits>` are ignored.
fn highest_matching_version(
    dir: &Path,
    prefix: &str,
    ceiling: Lsn,
) -> std::io::Result<Option<Lsn>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut best: Option<Lsn> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(suffix) = name.strip_prefix(prefix) else {
            continue;
        };
        let Ok(lsn) = suffix.parse::<Lsn>() else {
            continue;
        };
        if lsn <= ceiling && best.map(|b| lsn > b).unwrap_or(true) {
            best = Some(lsn);
        }
    }
    Ok(best)
}
