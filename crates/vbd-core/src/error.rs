use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use vbd_blobstore::BlobStoreError;
use vbd_metadata::MetadataError;
use vbd_types::{BlobId, TypeError};

/// Which entity a `NotFound` failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Missing {
    Client,
    Contract,
    Version,
    Blob,
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Contract => "contract",
            Self::Version => "version",
            Self::Blob => "blob",
        })
    }
}

/// Coarse classification of a [`DirectoryError`], stable across releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    ExternalStore,
    ExternalStoreTimeout,
    StorageUnavailable,
    StorageTimeout,
    StorageCorruption,
    CommitFailed,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("contract not found: {client_id}/{contract_id}")]
    ContractNotFound {
        client_id: String,
        contract_id: String,
    },

    #[error("version not found: {0}")]
    VersionNotFound(BlobId),

    #[error("blob not found: {0}")]
    BlobNotFound(BlobId),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("lineage rejected: {0}")]
    Lineage(#[from] TypeError),

    #[error("version {base} already advanced to {successor}")]
    VersionConflict { base: BlobId, successor: BlobId },

    #[error("external blob store error: {0}")]
    ExternalStore(#[source] BlobStoreError),

    #[error("external blob store did not answer within {0:?}")]
    ExternalStoreTimeout(Duration),

    #[error("metadata storage did not answer within {0:?}")]
    StorageTimeout(Duration),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("metadata task aborted: {0}")]
    StorageTask(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<BlobStoreError> for DirectoryError {
    fn from(err: BlobStoreError) -> Self {
        match err {
            BlobStoreError::NotFound(id) => Self::BlobNotFound(id),
            other => Self::ExternalStore(other),
        }
    }
}

impl DirectoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ClientNotFound(_)
            | Self::ContractNotFound { .. }
            | Self::VersionNotFound(_)
            | Self::BlobNotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) | Self::Lineage(_) | Self::Config(_) => ErrorKind::Validation,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::ExternalStore(_) => ErrorKind::ExternalStore,
            Self::ExternalStoreTimeout(_) => ErrorKind::ExternalStoreTimeout,
            Self::StorageTimeout(_) => ErrorKind::StorageTimeout,
            Self::StorageTask(_) => ErrorKind::StorageUnavailable,
            Self::Metadata(e) => match e {
                MetadataError::Unavailable { .. } => ErrorKind::StorageUnavailable,
                MetadataError::Corruption { .. } => ErrorKind::StorageCorruption,
                MetadataError::CommitFailed { .. } => ErrorKind::CommitFailed,
                MetadataError::RevisionConflict { .. } => ErrorKind::Conflict,
            },
        }
    }

    /// The entity a `NotFound` error names.
    pub fn missing(&self) -> Option<Missing> {
        match self {
            Self::ClientNotFound(_) => Some(Missing::Client),
            Self::ContractNotFound { .. } => Some(Missing::Contract),
            Self::VersionNotFound(_) => Some(Missing::Version),
            Self::BlobNotFound(_) => Some(Missing::Blob),
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalStore(e) => e.is_transient(),
            _ => matches!(
                self.kind(),
                ErrorKind::ExternalStoreTimeout
                    | ErrorKind::StorageTimeout
                    | ErrorKind::StorageUnavailable
                    | ErrorKind::Conflict
            ),
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
