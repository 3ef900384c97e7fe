use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use vbd_types::BlobId;

use crate::error::{BlobStoreError, BlobStoreResult};
use crate::traits::{BlobStore, RedundancyHint, StoreOutcome};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blob ids are the hex BLAKE3 hash of the
/// content, so storing the same bytes twice reports `AlreadyCertified`.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// The id this store assigns to `data`.
    pub fn id_for(data: &[u8]) -> BlobId {
        let hash = blake3::hash(data);
        BlobId::new(hex::encode(hash.as_bytes())).expect("hex digest is a valid blob id")
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if the store holds a blob with this id.
    pub fn contains(&self, id: &BlobId) -> bool {
        self.blobs.read().expect("lock poisoned").contains_key(id)
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, data: &[u8], _hint: RedundancyHint) -> BlobStoreResult<StoreOutcome> {
        let id = Self::id_for(data);
        let mut map = self.blobs.write().expect("lock poisoned");
        if map.contains_key(&id) {
            return Ok(StoreOutcome::AlreadyCertified(id));
        }
        map.insert(id.clone(), data.to_vec());
        Ok(StoreOutcome::NewlyCreated(id))
    }

    async fn fetch(&self, id: &BlobId) -> BlobStoreResult<Vec<u8>> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(id)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(id.clone()))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}
