//! In-memory implementation of [`MetadataBackend`] for tests and embedding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use vbd_types::MetadataStore;

use crate::error::{MetadataError, MetadataResult};
use crate::traits::MetadataBackend;

/// In-memory metadata backend.
///
/// Holds the committed aggregate behind a `RwLock` and counts commits, which
/// lets callers assert that an operation did not write.
pub struct InMemoryMetadataBackend {
    store: RwLock<MetadataStore>,
    commits: AtomicU64,
}

impl InMemoryMetadataBackend {
    /// Create an empty backend at revision 0.
    pub fn new() -> Self {
        Self::with_store(MetadataStore::default())
    }

    /// Start from an existing aggregate, as if it had been loaded from disk.
    pub fn with_store(mut store: MetadataStore) -> Self {
        store.normalize();
        Self {
            store: RwLock::new(store),
            commits: AtomicU64::new(0),
        }
    }

    /// Number of successful commits since construction.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryMetadataBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataBackend for InMemoryMetadataBackend {
    fn load(&self) -> MetadataResult<MetadataStore> {
        Ok(self.store.read().expect("lock poisoned").clone())
    }

    fn commit(&self, snapshot: &MetadataStore) -> MetadataResult<MetadataStore> {
        let mut current = self.store.write().expect("lock poisoned");
        if snapshot.revision != current.revision {
            return Err(MetadataError::RevisionConflict {
                expected: snapshot.revision,
                found: current.revision,
            });
        }
        let mut next = snapshot.clone();
        next.revision += 1;
        *current = next.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }
}

impl std::fmt::Debug for InMemoryMetadataBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read().expect("lock poisoned");
        f.debug_struct("InMemoryMetadataBackend")
            .field("revision", &store.revision)
            .field("clients", &store.clients.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbd_types::Client;

    fn with_client(mut store: MetadataStore, id: &str) -> MetadataStore {
        store.insert_client(Client::new(id, id)).unwrap();
        store
    }

    // ---- Empty backend loads revision 0 ----
    #[test]
    fn empty_backend_loads_revision_zero() {
        let backend = InMemoryMetadataBackend::new();
        let store = backend.load().unwrap();
        assert_eq!(store.revision, 0);
        assert!(store.clients.is_empty());
        assert_eq!(backend.revision().unwrap(), 0);
    }

    // ---- Commit advances the revision ----
    #[test]
    fn commit_advances_revision() {
        let backend = InMemoryMetadataBackend::new();
        let snapshot = with_client(backend.load().unwrap(), "C1");

        let committed = backend.commit(&snapshot).unwrap();
        assert_eq!(committed.revision, 1);
        assert_eq!(backend.load().unwrap(), committed);
        assert_eq!(backend.commit_count(), 1);
    }

    // ---- A stale snapshot is rejected ----
    #[test]
    fn stale_snapshot_conflicts() {
        let backend = InMemoryMetadataBackend::new();
        let first = with_client(backend.load().unwrap(), "C1");
        let second = with_client(backend.load().unwrap(), "C2");

        backend.commit(&first).unwrap();
        let err = backend.commit(&second).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::RevisionConflict {
                expected: 0,
                found: 1
            }
        ));
        assert!(err.is_retryable());

        let durable = backend.load().unwrap();
        assert!(durable.client("C1").is_some());
        assert!(durable.client("C2").is_none());
        assert_eq!(backend.commit_count(), 1);
    }

    // ---- Seeded store keeps its revision ----
    #[test]
    fn seeded_store_keeps_revision() {
        let mut seed = with_client(MetadataStore::default(), "C1");
        seed.revision = 7;
        let backend = InMemoryMetadataBackend::with_store(seed);
        assert_eq!(backend.revision().unwrap(), 7);
        assert!(backend.recheck().is_ok());
    }
}
