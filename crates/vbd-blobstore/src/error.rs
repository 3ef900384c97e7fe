use vbd_types::BlobId;

/// Errors from the external blob store boundary.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// The store does not know the requested blob.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// The store process could not be launched.
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The store process ran but reported failure.
    #[error("blob store exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The store answered with something that is not a valid response.
    #[error("malformed blob store response: {0}")]
    MalformedResponse(String),

    /// The store is reachable but refused service.
    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    /// Local I/O around the store call (staging files, pipes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobStoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Launch { .. } | Self::NonZeroExit { .. } | Self::Unavailable(_) | Self::Io(_)
        )
    }
}

/// Result alias for blob store operations.
pub type BlobStoreResult<T> = Result<T, BlobStoreError>;
