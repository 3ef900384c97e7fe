//! Foundation types for the Versioned Blob Directory (VBD).
//!
//! This crate provides the entity model shared by every other VBD crate:
//! content-addressed blob identifiers, version lineage records, and the
//! client → contract → version aggregate that the metadata store persists.
//!
//! # Key Types
//!
//! - [`BlobId`] — Opaque content address produced by the external blob store
//! - [`BlobIdentifier`] — A [`BlobId`] plus the locally observed timestamp
//! - [`ObservedAt`] — Millisecond wall-clock stamp assigned on observation
//! - [`VersionLineageRecord`] — One committed state of a contract
//! - [`Contract`], [`Client`], [`MetadataStore`] — The persisted aggregate
//! - [`QueryOptions`] — Filters accepted by the query engine
//! - [`ClientSummary`] — Read-only projection for listing clients

pub mod blob;
pub mod entity;
pub mod error;
pub mod query;
pub mod summary;
pub mod temporal;

pub use blob::{BlobId, BlobIdentifier};
pub use entity::{
    Acknowledgment, Client, Contract, MetadataStore, VersionLineageRecord, VersionLocation,
    DUPLICATE_ALIAS,
};
pub use error::TypeError;
pub use query::{QueryOptions, TimeRange};
pub use summary::{ClientSummary, ContractSummary, VersionSummary};
pub use temporal::ObservedAt;
