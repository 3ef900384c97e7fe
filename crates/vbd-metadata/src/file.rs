//! File-backed [`MetadataBackend`] using atomic write-then-rename commits.
//!
//! The durable document is a pretty-printed JSON file. A commit writes the
//! next snapshot into a temporary file in the same directory, fsyncs it, and
//! renames it over the durable file, so the path always names either the old
//! or the new document in full.
//!
//! Commits hold an in-process mutex and an exclusive lock on a sibling
//! `<document>.lock` file from the revision check through the rename, so
//! two committers at the same revision cannot both succeed, whether they
//! share this backend or run in separate processes.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};
use vbd_types::MetadataStore;

use crate::error::{MetadataError, MetadataResult};
use crate::traits::MetadataBackend;

/// Metadata backend persisted as a single JSON file.
pub struct FileMetadataBackend {
    path: PathBuf,
    /// Set when the durable file failed to parse; cleared only by `recheck`.
    corruption: Mutex<Option<String>>,
    /// Serializes committers sharing this backend.
    writer: Mutex<()>,
    #[cfg(test)]
    fail_mid_write: AtomicBool,
}

impl FileMetadataBackend {
    /// Use the document at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            corruption: Mutex::new(None),
            writer: Mutex::new(()),
            #[cfg(test)]
            fail_mid_write: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the corruption latch is set.
    pub fn is_corrupted(&self) -> bool {
        self.corruption.lock().expect("lock poisoned").is_some()
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Sibling file whose exclusive lock guards commits across processes.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.dir().join(name)
    }

    /// Open the lock file and block until it is held exclusively. The lock
    /// is released when the returned file is dropped.
    fn acquire_file_lock(&self) -> MetadataResult<File> {
        let unavailable = |source| MetadataError::Unavailable {
            path: self.lock_path(),
            source,
        };
        std::fs::create_dir_all(self.dir()).map_err(unavailable)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(unavailable)?;
        file.lock_exclusive().map_err(unavailable)?;
        Ok(file)
    }

    fn check_latch(&self) -> MetadataResult<()> {
        match self.corruption.lock().expect("lock poisoned").as_ref() {
            Some(reason) => Err(self.corrupted(reason.clone())),
            None => Ok(()),
        }
    }

    fn corrupted(&self, reason: String) -> MetadataError {
        MetadataError::Corruption {
            path: self.path.clone(),
            reason,
        }
    }

    fn latch(&self, reason: &str) {
        error!(path = %self.path.display(), reason, "metadata document corrupted; refusing further operations");
        *self.corruption.lock().expect("lock poisoned") = Some(reason.to_string());
    }

    /// Raw durable bytes, or `None` when no document has been written yet.
    fn read_durable(&self) -> MetadataResult<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MetadataError::Unavailable {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Parse durable bytes, setting the latch when they are not a store.
    fn parse(&self, bytes: Option<&[u8]>) -> MetadataResult<MetadataStore> {
        let Some(bytes) = bytes else {
            return Ok(MetadataStore::default());
        };
        let mut store: MetadataStore = match serde_json::from_slice(bytes) {
            Ok(store) => store,
            Err(e) => {
                let reason = e.to_string();
                self.latch(&reason);
                return Err(self.corrupted(reason));
            }
        };
        store.normalize();
        for issue in store.lineage_issues() {
            warn!(path = %self.path.display(), issue = %issue, "inconsistent lineage record");
        }
        Ok(store)
    }

    /// Replace the durable file with `bytes` through a same-directory
    /// temporary file.
    fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        let dir = self.dir();
        std::fs::create_dir_all(dir)?;
        let mut staged = NamedTempFile::new_in(dir)?;

        #[cfg(test)]
        if self.fail_mid_write.load(Ordering::SeqCst) {
            staged.write_all(&bytes[..bytes.len() / 2])?;
            return Err(std::io::Error::other("injected failure mid-write"));
        }

        staged.write_all(bytes)?;
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;
        sync_dir(dir)
    }

    /// Put the rollback candidate back if the durable file no longer matches
    /// it. Returns whether the candidate is known to be in place.
    fn restore(&self, candidate: Option<&[u8]>) -> bool {
        let durable = match self.read_durable() {
            Ok(durable) => durable,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "cannot re-read metadata after failed commit");
                return false;
            }
        };
        if durable.as_deref() == candidate {
            debug!(path = %self.path.display(), "durable metadata unchanged after failed commit");
            return true;
        }

        warn!(path = %self.path.display(), "durable metadata differs from rollback candidate; restoring");
        let result = match candidate {
            Some(bytes) => self.write_atomic(bytes),
            None => std::fs::remove_file(&self.path),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to restore rollback candidate");
                false
            }
        }
    }

    #[cfg(test)]
    fn inject_write_failure(&self, fail: bool) {
        self.fail_mid_write.store(fail, Ordering::SeqCst);
    }
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    std::fs::File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

impl MetadataBackend for FileMetadataBackend {
    fn load(&self) -> MetadataResult<MetadataStore> {
        self.check_latch()?;
        let bytes = self.read_durable()?;
        self.parse(bytes.as_deref())
    }

    fn commit(&self, snapshot: &MetadataStore) -> MetadataResult<MetadataStore> {
        let _writer = self.writer.lock().expect("lock poisoned");
        self.check_latch()?;
        let _lock = self.acquire_file_lock()?;

        let candidate = self.read_durable()?;
        let durable = self.parse(candidate.as_deref())?;
        if durable.revision != snapshot.revision {
            return Err(MetadataError::RevisionConflict {
                expected: snapshot.revision,
                found: durable.revision,
            });
        }

        let mut next = snapshot.clone();
        next.revision += 1;
        let bytes = serde_json::to_vec_pretty(&next).map_err(|e| MetadataError::CommitFailed {
            reason: format!("serialization: {e}"),
            restored: true,
        })?;

        match self.write_atomic(&bytes) {
            Ok(()) => {
                info!(path = %self.path.display(), revision = next.revision, "metadata committed");
                Ok(next)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "metadata commit failed");
                let restored = self.restore(candidate.as_deref());
                Err(MetadataError::CommitFailed {
                    reason: e.to_string(),
                    restored,
                })
            }
        }
    }

    fn recheck(&self) -> MetadataResult<()> {
        *self.corruption.lock().expect("lock poisoned") = None;
        let bytes = self.read_durable()?;
        self.parse(bytes.as_deref())?;
        info!(path = %self.path.display(), "metadata document validated");
        Ok(())
    }
}

impl std::fmt::Debug for FileMetadataBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetadataBackend")
            .field("path", &self.path)
            .field("corrupted", &self.is_corrupted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use vbd_types::{BlobId, BlobIdentifier, Client, Contract, ObservedAt, VersionLineageRecord};

    fn backend() -> (tempfile::TempDir, FileMetadataBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileMetadataBackend::new(dir.path().join("local_db.json"));
        (dir, backend)
    }

    fn sample(mut store: MetadataStore) -> MetadataStore {
        let mut contract = Contract::new("K1", "lease");
        contract
            .append(VersionLineageRecord::genesis(
                BlobIdentifier::new(BlobId::new("b0").unwrap(), ObservedAt::from_millis(10)),
                "draft",
            ))
            .unwrap();
        let client = store.insert_client(Client::new("C1", "Acme")).unwrap();
        client.insert_contract(contract).unwrap();
        store
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with(".lock"))
            .collect();
        names.sort();
        names
    }

    // ---------------------------------------------------------------
    // Load / commit
    // ---------------------------------------------------------------

    #[test]
    fn missing_file_loads_empty_store() {
        let (_dir, backend) = backend();
        let store = backend.load().unwrap();
        assert_eq!(store, MetadataStore::default());
    }

    #[test]
    fn commit_then_load_roundtrips() {
        let (_dir, backend) = backend();
        let committed = backend.commit(&sample(backend.load().unwrap())).unwrap();
        assert_eq!(committed.revision, 1);

        let reopened = FileMetadataBackend::new(backend.path());
        assert_eq!(reopened.load().unwrap(), committed);
    }

    #[test]
    fn document_is_pretty_printed_with_snake_case_fields() {
        let (_dir, backend) = backend();
        backend.commit(&sample(MetadataStore::default())).unwrap();
        let text = std::fs::read_to_string(backend.path()).unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("\"client_id\""));
        assert!(text.contains("\"current_blob\""));
    }

    #[test]
    fn stale_snapshot_conflicts() {
        let (_dir, backend) = backend();
        let stale = backend.load().unwrap();
        backend.commit(&sample(stale.clone())).unwrap();

        let mut other = stale;
        other.insert_client(Client::new("C2", "Other")).unwrap();
        let err = backend.commit(&other).unwrap_err();
        assert!(matches!(err, MetadataError::RevisionConflict { expected: 0, found: 1 }));
        assert!(backend.load().unwrap().client("C2").is_none());
    }

    /// Commit one snapshot of revision `base` per backend, all released
    /// together, and return the results in backend order.
    fn race(backends: &[Arc<FileMetadataBackend>], base: &MetadataStore, round: usize) -> Vec<MetadataResult<MetadataStore>> {
        let barrier = Arc::new(Barrier::new(backends.len()));
        let handles: Vec<_> = backends
            .iter()
            .enumerate()
            .map(|(i, backend)| {
                let backend = Arc::clone(backend);
                let barrier = Arc::clone(&barrier);
                let mut snapshot = base.clone();
                snapshot
                    .insert_client(Client::new(format!("C{round}-{i}"), "Racer"))
                    .unwrap();
                std::thread::spawn(move || {
                    barrier.wait();
                    backend.commit(&snapshot)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    fn assert_one_winner(results: &[MetadataResult<MetadataStore>]) {
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(MetadataError::RevisionConflict { .. })))
            .count();
        assert_eq!((ok, conflicts), (1, results.len() - 1), "{results:?}");
    }

    #[test]
    fn concurrent_commits_on_shared_backend_admit_one() {
        let (_dir, backend) = backend();
        let backend = Arc::new(backend);
        let racers = [Arc::clone(&backend), Arc::clone(&backend)];
        for round in 0..50 {
            let base = backend.load().unwrap();
            assert_one_winner(&race(&racers, &base, round));
            let durable = backend.load().unwrap();
            assert_eq!(durable.revision, round as u64 + 1);
            assert_eq!(durable.clients.len(), round + 1);
        }
    }

    #[test]
    fn concurrent_commits_through_separate_handles_admit_one() {
        let (dir, first) = backend();
        let second = FileMetadataBackend::new(first.path());
        let racers = [Arc::new(first), Arc::new(second)];
        for round in 0..50 {
            let base = racers[0].load().unwrap();
            assert_one_winner(&race(&racers, &base, round));
            assert_eq!(racers[1].load().unwrap().clients.len(), round + 1);
        }
        assert_eq!(dir_entries(dir.path()), vec!["local_db.json".to_string()]);
    }

    #[test]
    fn legacy_document_loads() {
        let (_dir, backend) = backend();
        let legacy = r#"{
            "clients": [{
                "client_id": "C1",
                "name": "Acme",
                "contracts": [{
                    "contract_id": "K1",
                    "versions": [{
                        "blob_id": "b0",
                        "initial_blob_data": "b0",
                        "previous_versions": [],
                        "alias": null
                    }]
                }]
            }]
        }"#;
        std::fs::write(backend.path(), legacy).unwrap();

        let store = backend.load().unwrap();
        assert_eq!(store.revision, 0);
        let contract = store.client("C1").unwrap().contract("K1").unwrap();
        assert_eq!(contract.versions()[0].ordinal(), 1);
    }

    // ---------------------------------------------------------------
    // Failure handling
    // ---------------------------------------------------------------

    #[test]
    fn failed_commit_leaves_previous_document_intact() {
        let (dir, backend) = backend();
        let committed = backend.commit(&sample(MetadataStore::default())).unwrap();
        let before = std::fs::read(backend.path()).unwrap();

        let mut next = committed.clone();
        next.insert_client(Client::new("C2", "Other")).unwrap();
        backend.inject_write_failure(true);
        let err = backend.commit(&next).unwrap_err();
        assert!(matches!(err, MetadataError::CommitFailed { restored: true, .. }));

        assert_eq!(std::fs::read(backend.path()).unwrap(), before);
        assert_eq!(backend.load().unwrap(), committed);
        assert_eq!(dir_entries(dir.path()), vec!["local_db.json".to_string()]);

        backend.inject_write_failure(false);
        assert_eq!(backend.commit(&next).unwrap().revision, 2);
    }

    #[test]
    fn failed_first_commit_leaves_no_document() {
        let (dir, backend) = backend();
        backend.inject_write_failure(true);
        assert!(backend.commit(&sample(MetadataStore::default())).is_err());
        assert!(dir_entries(dir.path()).is_empty());
        assert_eq!(backend.load().unwrap(), MetadataStore::default());
    }

    #[test]
    fn restore_rewrites_a_diverged_document() {
        let (_dir, backend) = backend();
        backend.commit(&sample(MetadataStore::default())).unwrap();
        let candidate = std::fs::read(backend.path()).unwrap();

        std::fs::write(backend.path(), b"{\"clients\": []}").unwrap();
        assert!(backend.restore(Some(&candidate)));
        assert_eq!(std::fs::read(backend.path()).unwrap(), candidate);

        assert!(backend.restore(None));
        assert!(!backend.path().exists());
    }

    #[test]
    fn corruption_latches_until_recheck() {
        let (_dir, backend) = backend();
        std::fs::write(backend.path(), b"{ not json").unwrap();

        assert!(matches!(backend.load(), Err(MetadataError::Corruption { .. })));
        assert!(backend.is_corrupted());

        // Repaired on disk, but the latch still refuses service.
        std::fs::write(backend.path(), b"{\"clients\": []}").unwrap();
        assert!(matches!(backend.load(), Err(MetadataError::Corruption { .. })));
        assert!(matches!(
            backend.commit(&MetadataStore::default()),
            Err(MetadataError::Corruption { .. })
        ));

        backend.recheck().unwrap();
        assert!(!backend.is_corrupted());
        assert!(backend.load().unwrap().clients.is_empty());
    }

    #[test]
    fn recheck_relatches_when_still_corrupt() {
        let (_dir, backend) = backend();
        std::fs::write(backend.path(), b"").unwrap();
        let err = backend.recheck().unwrap_err();
        assert!(matches!(err, MetadataError::Corruption { .. }));
        assert!(!err.is_retryable());
        assert!(backend.is_corrupted());
    }

    #[test]
    fn unreadable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the document path cannot be read as a file.
        let backend = FileMetadataBackend::new(dir.path());
        let err = backend.load().unwrap_err();
        assert!(matches!(err, MetadataError::Unavailable { .. }));
    }
}
