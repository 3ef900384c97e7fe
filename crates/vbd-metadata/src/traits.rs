//! The [`MetadataBackend`] trait defining the durable storage interface.

use vbd_types::MetadataStore;

use crate::error::MetadataResult;

/// Durable home of the whole [`MetadataStore`] aggregate.
///
/// The aggregate is read and written as one document. Implementations must
/// be thread-safe (`Send + Sync`) and guarantee:
///
/// - `commit` either replaces the durable document completely or leaves the
///   previous one in place. No reader ever observes a partial document.
/// - `commit` only succeeds when the snapshot's `revision` equals the durable
///   revision, and the committed document carries `revision + 1`.
/// - A missing document loads as an empty store at revision 0.
pub trait MetadataBackend: Send + Sync {
    /// Read the current durable aggregate.
    fn load(&self) -> MetadataResult<MetadataStore>;

    /// Atomically replace the durable aggregate with `snapshot`.
    ///
    /// Returns the store exactly as committed, with its revision advanced.
    fn commit(&self, snapshot: &MetadataStore) -> MetadataResult<MetadataStore>;

    /// Re-examine the durable document after a corruption report.
    ///
    /// Backends without a corruption latch only need to prove the document
    /// loads.
    fn recheck(&self) -> MetadataResult<()> {
        self.load().map(|_| ())
    }

    /// The durable revision.
    fn revision(&self) -> MetadataResult<u64> {
        Ok(self.load()?.revision)
    }
}
