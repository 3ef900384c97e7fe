//! Error types for metadata persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or committing the metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The durable document could not be read.
    #[error("metadata storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The durable document exists but does not parse as a metadata store.
    ///
    /// Once observed, the backend refuses every operation until
    /// [`MetadataBackend::recheck`](crate::MetadataBackend::recheck) succeeds.
    #[error("metadata storage corrupted at {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// A commit did not become durable. `restored` reports whether the
    /// previous document is known to be in place again.
    #[error("metadata commit failed: {reason}")]
    CommitFailed { reason: String, restored: bool },

    /// The snapshot was taken at a revision that is no longer current.
    #[error("metadata revision conflict: snapshot at {expected}, durable at {found}")]
    RevisionConflict { expected: u64, found: u64 },
}

impl MetadataError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::RevisionConflict { .. }
        )
    }
}

/// Convenience type alias for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
