//! Boundary to the external content-addressable blob store.
//!
//! The Versioned Blob Directory never stores document bytes itself. Bytes are
//! handed to an external deduplicating store which answers with a blob id,
//! either freshly created or already certified. This crate defines that
//! contract and ships two implementations.
//!
//! # Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- BLAKE3-addressed `HashMap` store for tests and embedding
//! - [`WalrusCliStore`] -- drives the `walrus` CLI's JSON mode as a subprocess
//!
//! # Design Rules
//!
//! 1. Blob ids come only from the store; callers never compute them.
//! 2. Storing bytes the store already holds reports `AlreadyCertified`.
//! 3. Every transport, process, or parse failure is an error, never a default.
//! 4. The store configuration is injected, never a hardcoded location.

pub mod error;
pub mod memory;
pub mod traits;
pub mod walrus;

pub use error::{BlobStoreError, BlobStoreResult};
pub use memory::InMemoryBlobStore;
pub use traits::{BlobStore, RedundancyHint, StoreOutcome};
pub use walrus::{WalrusCliConfig, WalrusCliStore};
