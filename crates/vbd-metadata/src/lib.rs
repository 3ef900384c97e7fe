//! Crash-safe persistence for the Versioned Blob Directory metadata store.
//!
//! The whole client → contract → version aggregate lives in one JSON
//! document. Every mutation is a full-document commit guarded by a revision
//! number, so concurrent writers cannot silently overwrite each other.
//!
//! # Modules
//!
//! - [`error`] — Error types for persistence operations
//! - [`traits`] — The [`MetadataBackend`] trait
//! - [`file`] — [`FileMetadataBackend`], atomic write-then-rename on disk
//! - [`memory`] — [`InMemoryMetadataBackend`] for tests and embedding

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{MetadataError, MetadataResult};
pub use file::FileMetadataBackend;
pub use memory::InMemoryMetadataBackend;
pub use traits::MetadataBackend;
