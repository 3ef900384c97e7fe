//! Blobs the external store created but no lineage records.
//!
//! An upload can lose its commit after the store already created the blob:
//! the caller cancels, a timeout fires, or the commit fails. The store now
//! reports those bytes as already certified, which would turn a retry into a
//! duplicate. The registry remembers such blobs per client and attachment
//! point (the base version, or the contract for a first version) so the
//! retry adopts the blob instead.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use tracing::warn;
use vbd_types::BlobId;

/// Where an orphaned blob was meant to attach.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrphanTarget {
    /// First version of a lineage in this contract.
    Genesis(String),
    /// Successor of this version.
    Successor(BlobId),
}

impl fmt::Display for OrphanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Genesis(contract_id) => write!(f, "genesis of {contract_id}"),
            Self::Successor(base) => write!(f, "successor of {base}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrphanKey {
    pub client_id: String,
    pub target: OrphanTarget,
}

impl OrphanKey {
    pub fn genesis(client_id: impl Into<String>, contract_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            target: OrphanTarget::Genesis(contract_id.into()),
        }
    }

    pub fn successor(client_id: impl Into<String>, base: BlobId) -> Self {
        Self {
            client_id: client_id.into(),
            target: OrphanTarget::Successor(base),
        }
    }
}

#[derive(Default)]
pub struct OrphanRegistry {
    orphans: Mutex<HashMap<OrphanKey, HashSet<BlobId>>>,
}

impl OrphanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: OrphanKey, blob: BlobId) {
        let mut orphans = self.orphans.lock().expect("lock poisoned");
        orphans.entry(key).or_default().insert(blob);
    }

    /// Remove `blob` from the orphans of `key`, returning whether it was
    /// there.
    pub fn take(&self, key: &OrphanKey, blob: &BlobId) -> bool {
        let mut orphans = self.orphans.lock().expect("lock poisoned");
        let Some(blobs) = orphans.get_mut(key) else {
            return false;
        };
        let found = blobs.remove(blob);
        if blobs.is_empty() {
            orphans.remove(key);
        }
        found
    }

    pub fn contains(&self, key: &OrphanKey, blob: &BlobId) -> bool {
        let orphans = self.orphans.lock().expect("lock poisoned");
        orphans.get(key).is_some_and(|blobs| blobs.contains(blob))
    }

    /// Total number of orphaned blobs.
    pub fn len(&self) -> usize {
        let orphans = self.orphans.lock().expect("lock poisoned");
        orphans.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track a freshly created blob until its commit lands.
    pub fn guard(&self, key: OrphanKey, blob: BlobId) -> OrphanGuard<'_> {
        OrphanGuard {
            registry: self,
            key,
            blob: Some(blob),
        }
    }
}

impl std::fmt::Debug for OrphanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanRegistry")
            .field("orphans", &self.len())
            .finish()
    }
}

/// Records its blob as orphaned when dropped without [`OrphanGuard::committed`].
///
/// Dropping happens on early return, on error, and when the owning future is
/// cancelled or times out.
pub struct OrphanGuard<'a> {
    registry: &'a OrphanRegistry,
    key: OrphanKey,
    blob: Option<BlobId>,
}

impl OrphanGuard<'_> {
    /// The blob is now part of a committed lineage.
    pub fn committed(mut self) {
        self.blob = None;
    }
}

impl Drop for OrphanGuard<'_> {
    fn drop(&mut self) {
        if let Some(blob) = self.blob.take() {
            warn!(
                client_id = %self.key.client_id,
                target = %self.key.target,
                blob_id = %blob,
                "blob created by the store was not committed; recording as orphan"
            );
            self.registry.record(self.key.clone(), blob);
        }
    }
}
