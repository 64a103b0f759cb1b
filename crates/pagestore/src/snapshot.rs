use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use pageserver_common::{Lsn, PageServerError};
use serde::{Deserialize, Serialize};

/// An immutable bookmark onto one LSN. Snapshots don't copy any page data;
/// they're resolved at read time by replaying the same greatest-LSN-<=-target
/// rule any other time-travel read uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub lsn: Lsn,
    pub timestamp: u64,
    pub description: String,
}

/// Persists snapshots as one JSON file per id under `<data_dir>/snapshots/`,
/// with an in-memory id->Snapshot map built once at `open` and kept in sync
/// on every write so reads never touch the filesystem.
pub struct SnapshotIndex {
    dir: PathBuf,
    entries: Mutex<HashMap<String, Snapshot>>,
}

impl SnapshotIndex {
    /// Scans `<data_dir>/snapshots/` for `*.json` files and loads them into
    /// the in-memory map, silently skipping anything that doesn't parse as a
    /// `Snapshot` (partial writes, files left over from an older format).
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, PageServerError> {
        let dir = data_dir.as_ref().join("snapshots");
        fs::create_dir_all(&dir)?;

        let mut entries = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = fs::read(&path) else { continue };
            let Ok(snapshot) = serde_json::from_slice::<Snapshot>(&bytes) else {
                continue;
            };
            entries.insert(snapshot.id.clone(), snapshot);
        }

        Ok(Self {
            dir,
            entries: Mutex::new(entries),
        })
    }

    /// Mint a new snapshot at `lsn` with `id = "snapshot_<lsn>_<unix_seconds>"`,
    /// write it to disk, and register it in the in-memory map.
    pub fn create(&self, lsn: Lsn, description: &str) -> Result<Snapshot, PageServerError> {
        let timestamp = unix_seconds();
        let id = format!("snapshot_{lsn}_{timestamp}");
        let snapshot = Snapshot {
            id: id.clone(),
            lsn,
            timestamp,
            description: description.to_string(),
        };

        let path = self.path_for(&id);
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| PageServerError::Storage(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        self.entries.lock().unwrap().insert(id, snapshot.clone());
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Result<Option<Snapshot>, PageServerError> {
        Ok(self.entries.lock().unwrap().get(id).cloned())
    }

    pub fn list(&self) -> Result<Vec<Snapshot>, PageServerError> {
        let mut out: Vec<Snapshot> = self.entries.lock().unwrap().values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> Result<bool, PageServerError> {
        let removed = self.entries.lock().unwrap().remove(id).is_some();
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(removed)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index = SnapshotIndex::open(dir.path()).unwrap();

        let created = index.create(42, "before-migration").unwrap();
        let snapshot = index.get(&created.id).unwrap().unwrap();
        assert_eq!(snapshot.lsn, 42);
        assert_eq!(snapshot.description, "before-migration");
        assert!(snapshot.id.starts_with("snapshot_42_"));
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let index = SnapshotIndex::open(dir.path()).unwrap();
        assert!(index.get("nope").unwrap().is_none());
    }

    #[test]
    fn list_returns_all_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = SnapshotIndex::open(dir.path()).unwrap();

        index.create(1, "zeta").unwrap();
        index.create(2, "alpha").unwrap();

        let ids: Vec<_> = index.list().unwrap().into_iter().map(|s| s.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn delete_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let index = SnapshotIndex::open(dir.path()).unwrap();

        let created = index.create(1, "temp").unwrap();
        assert!(index.delete(&created.id).unwrap());
        assert!(index.get(&created.id).unwrap().is_none());
        assert!(!index.delete(&created.id).unwrap());
    }

    #[test]
    fn open_ignores_unparseable_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots_dir = dir.path().join("snapshots");
        fs::create_dir_all(&snapshots_dir).unwrap();
        fs::write(snapshots_dir.join("garbage.json"), b"not json at all").unwrap();

        let index = SnapshotIndex::open(dir.path()).unwrap();
        assert!(index.list().unwrap().is_empty());
    }

    #[test]
    fn reopen_recovers_snapshots_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let created = {
            let index = SnapshotIndex::open(dir.path()).unwrap();
            index.create(5, "checkpoint").unwrap()
        };

        let reopened = SnapshotIndex::open(dir.path()).unwrap();
        let snapshot = reopened.get(&created.id).unwrap().unwrap();
        assert_eq!(snapshot.lsn, 5);
    }
}
