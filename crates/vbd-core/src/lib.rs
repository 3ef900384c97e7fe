//! The Versioned Blob Directory.
//!
//! Tracks successive versions of client contracts whose bytes live in an
//! external content-addressable blob store. This crate coordinates uploads
//! against the store's deduplication, keeps version lineages consistent,
//! and answers history queries.
//!
//! The entry point is [`Directory`], an explicit handle over an injected
//! [`MetadataBackend`](vbd_metadata::MetadataBackend) and
//! [`BlobStore`](vbd_blobstore::BlobStore).

pub mod config;
pub mod directory;
pub mod error;
pub mod lock;
pub mod orphan;
pub mod query;
pub mod signing;
pub mod upload;

pub use config::{DirectoryConfig, StoreConfig};
pub use directory::Directory;
pub use error::{DirectoryError, DirectoryResult, ErrorKind, Missing};
pub use orphan::{OrphanKey, OrphanRegistry, OrphanTarget};
pub use query::{ContractQuery, IgnoredFilter};
pub use signing::{SignatureReceipt, SignatureRequest};
pub use upload::UploadOutcome;

// Re-export key types
pub use vbd_types::{
    BlobId, BlobIdentifier, Client, ClientSummary, Contract, MetadataStore, ObservedAt,
    QueryOptions, TimeRange, VersionLineageRecord,
};
