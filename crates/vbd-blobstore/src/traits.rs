use async_trait::async_trait;
use vbd_types::BlobId;

use crate::error::BlobStoreResult;

/// How many storage epochs the store should keep the blob for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedundancyHint {
    pub epochs: u32,
}

impl Default for RedundancyHint {
    fn default() -> Self {
        Self { epochs: 2 }
    }
}

/// The two disjoint answers to a store request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The bytes were new; the store created this blob.
    NewlyCreated(BlobId),
    /// The store already held these bytes under this blob id.
    AlreadyCertified(BlobId),
}

impl StoreOutcome {
    pub fn blob_id(&self) -> &BlobId {
        match self {
            Self::NewlyCreated(id) | Self::AlreadyCertified(id) => id,
        }
    }

    pub fn is_newly_created(&self) -> bool {
        matches!(self, Self::NewlyCreated(_))
    }
}

/// External content-addressable blob store.
///
/// All implementations must satisfy these invariants:
/// - Identical bytes always map to the same blob id.
/// - A second `store` of known bytes reports `AlreadyCertified` with the
///   existing id and creates nothing.
/// - `fetch` returns exactly the bytes that were stored.
/// - Failures are reported as errors; an implementation never invents an id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Hand `data` to the store.
    async fn store(&self, data: &[u8], hint: RedundancyHint) -> BlobStoreResult<StoreOutcome>;

    /// Read back the bytes of a blob.
    ///
    /// Returns `BlobStoreError::NotFound` if the id is unknown.
    async fn fetch(&self, id: &BlobId) -> BlobStoreResult<Vec<u8>>;
}
