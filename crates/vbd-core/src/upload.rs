//! Upload coordination: turning a store outcome into a lineage change.
//!
//! The functions here are pure over a [`MetadataStore`] snapshot; the
//! [`Directory`](crate::Directory) supplies locking, I/O and timeouts around
//! them.

use serde::Serialize;
use tracing::debug;
use vbd_types::{
    BlobId, BlobIdentifier, Client, Contract, MetadataStore, VersionLineageRecord, VersionLocation,
};

use crate::error::{DirectoryError, DirectoryResult};

/// Result of submitting bytes to the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "version", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// The store created the blob and the lineage advanced.
    Created(VersionLineageRecord),
    /// The store already held the bytes; nothing was committed.
    Deduplicated(VersionLineageRecord),
}

impl UploadOutcome {
    pub fn record(&self) -> &VersionLineageRecord {
        match self {
            Self::Created(record) | Self::Deduplicated(record) => record,
        }
    }

    pub fn into_record(self) -> VersionLineageRecord {
        match self {
            Self::Created(record) | Self::Deduplicated(record) => record,
        }
    }

    pub fn blob_id(&self) -> &BlobId {
        &self.record().current_blob().id
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

pub fn client<'a>(store: &'a MetadataStore, client_id: &str) -> DirectoryResult<&'a Client> {
    store
        .client(client_id)
        .ok_or_else(|| DirectoryError::ClientNotFound(client_id.to_string()))
}

pub fn client_mut<'a>(
    store: &'a mut MetadataStore,
    client_id: &str,
) -> DirectoryResult<&'a mut Client> {
    store
        .client_mut(client_id)
        .ok_or_else(|| DirectoryError::ClientNotFound(client_id.to_string()))
}

pub fn contract_mut<'a>(
    client: &'a mut Client,
    contract_id: &str,
) -> DirectoryResult<&'a mut Contract> {
    let client_id = client.client_id.clone();
    client
        .contract_mut(contract_id)
        .ok_or_else(|| DirectoryError::ContractNotFound {
            client_id,
            contract_id: contract_id.to_string(),
        })
}

/// Find the base version across all of the client's contracts, first match
/// wins, and make sure its lineage has not advanced past it.
pub fn resolve_base(
    store: &MetadataStore,
    client_id: &str,
    base: &BlobId,
) -> DirectoryResult<(VersionLocation, VersionLineageRecord)> {
    let client = client(store, client_id)?;
    let location = client
        .locate_version(base)
        .ok_or_else(|| DirectoryError::VersionNotFound(base.clone()))?;
    let contract = &client.contracts[location.contract_index];
    if let Some(successor) = contract.successor_of(base) {
        return Err(DirectoryError::VersionConflict {
            base: base.clone(),
            successor: successor.current_blob().id.clone(),
        });
    }
    let record = contract.versions()[location.version_index].clone();
    debug!(
        client_id,
        contract_id = %contract.contract_id,
        base = %base,
        ordinal = record.ordinal(),
        "resolved base version"
    );
    Ok((location, record))
}

/// Append the successor of `base` carrying `blob` to the base's contract.
///
/// The base is resolved again against `store`, which must be the latest
/// snapshot, so a lineage that advanced in the meantime is reported as a
/// conflict rather than forked.
pub fn append_successor(
    store: &mut MetadataStore,
    client_id: &str,
    base: &BlobId,
    blob: BlobIdentifier,
) -> DirectoryResult<VersionLineageRecord> {
    let (location, base_record) = resolve_base(store, client_id, base)?;
    let record = base_record.successor(blob);
    let client = client_mut(store, client_id)?;
    client.contracts[location.contract_index].append(record.clone())?;
    Ok(record)
}

/// Start a new lineage in an existing contract.
pub fn append_genesis(
    store: &mut MetadataStore,
    client_id: &str,
    contract_id: &str,
    blob: BlobIdentifier,
    alias: &str,
) -> DirectoryResult<VersionLineageRecord> {
    let record = VersionLineageRecord::genesis(blob, alias);
    let client = client_mut(store, client_id)?;
    contract_mut(client, contract_id)?.append(record.clone())?;
    Ok(record)
}

/// Create a contract whose only version is the genesis of `blob`.
pub fn insert_contract(
    store: &mut MetadataStore,
    client_id: &str,
    contract: Contract,
    blob: BlobIdentifier,
    alias: &str,
) -> DirectoryResult<VersionLineageRecord> {
    let record = VersionLineageRecord::genesis(blob, alias);
    let client = client_mut(store, client_id)?;
    let contract = client.insert_contract(contract)?;
    contract.append(record.clone())?;
    Ok(record)
}

/// The record reported for bytes the store already held.
///
/// When one of the client's versions already carries the blob, the report is
/// a copy of that version; otherwise it is a detached record.
pub fn duplicate_record(client: &Client, blob: &BlobId) -> VersionLineageRecord {
    match client
        .locate_version(blob)
        .and_then(|location| client.version_at(location))
    {
        Some(existing) => existing.marked_duplicate(),
        None => VersionLineageRecord::detached_duplicate(BlobIdentifier::observed_now(blob.clone())),
    }
}

/// Whether any version of the client already carries `blob`.
pub fn is_owned(client: &Client, blob: &BlobId) -> bool {
    client.locate_version(blob).is_some()
}
