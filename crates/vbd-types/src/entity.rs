//! The persisted entity graph: clients own contracts, contracts own version
//! lineages, and every version points at blobs in the external store.
//!
//! Lineage invariants are enforced by construction. A [`VersionLineageRecord`]
//! can only be created as a lineage genesis or as the successor of an existing
//! record, and [`Contract::append`] refuses records whose ancestor chain does
//! not extend a version already present in the contract.

use serde::{Deserialize, Deserializer, Serialize};

use crate::blob::{BlobId, BlobIdentifier};
use crate::error::TypeError;
use crate::temporal::ObservedAt;

/// Alias carried by records that describe deduplicated uploads.
pub const DUPLICATE_ALIAS: &str = "already-exists";

const DEFAULT_CONTRACT_NAME: &str = "default name";

/// A recorded signature acknowledgment on one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub signer: String,
    pub acknowledged_at: ObservedAt,
}

/// One committed state of a contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLineageRecord {
    #[serde(alias = "blob_id")]
    current_blob: BlobIdentifier,
    #[serde(alias = "initial_blob_data")]
    origin_blob: BlobIdentifier,
    #[serde(default, alias = "previous_versions")]
    ancestors: Vec<BlobIdentifier>,
    /// Position within the lineage, starting at 1. Zero only for detached
    /// duplicate records and for legacy documents before normalization.
    #[serde(default)]
    ordinal: u32,
    #[serde(default, deserialize_with = "nullable_string")]
    alias: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    acknowledgments: Vec<Acknowledgment>,
}

impl VersionLineageRecord {
    /// First version of a new lineage: the blob is its own origin.
    pub fn genesis(blob: BlobIdentifier, alias: impl Into<String>) -> Self {
        Self {
            origin_blob: blob.clone(),
            current_blob: blob,
            ancestors: Vec::new(),
            ordinal: 1,
            alias: alias.into(),
            acknowledgments: Vec::new(),
        }
    }

    /// The version that follows `self` once `blob` has been stored.
    ///
    /// Origin and alias are inherited; the ancestor chain grows by exactly
    /// `self.current_blob`.
    pub fn successor(&self, blob: BlobIdentifier) -> Self {
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.extend(self.ancestors.iter().cloned());
        ancestors.push(self.current_blob.clone());
        Self {
            current_blob: blob,
            origin_blob: self.origin_blob.clone(),
            ancestors,
            ordinal: self.ordinal + 1,
            alias: self.alias.clone(),
            acknowledgments: Vec::new(),
        }
    }

    /// A record for content the blob store already held, not attached to any
    /// lineage.
    pub fn detached_duplicate(blob: BlobIdentifier) -> Self {
        Self {
            origin_blob: blob.clone(),
            current_blob: blob,
            ancestors: Vec::new(),
            ordinal: 0,
            alias: DUPLICATE_ALIAS.into(),
            acknowledgments: Vec::new(),
        }
    }

    /// Copy of this record relabelled as a duplicate.
    pub fn marked_duplicate(&self) -> Self {
        Self {
            alias: DUPLICATE_ALIAS.into(),
            ..self.clone()
        }
    }

    pub fn current_blob(&self) -> &BlobIdentifier {
        &self.current_blob
    }

    pub fn origin_blob(&self) -> &BlobIdentifier {
        &self.origin_blob
    }

    /// Ancestors in creation order, oldest first.
    pub fn ancestors(&self) -> &[BlobIdentifier] {
        &self.ancestors
    }

    /// The version this one was created from, if any.
    pub fn parent(&self) -> Option<&BlobIdentifier> {
        self.ancestors.last()
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn acknowledgments(&self) -> &[Acknowledgment] {
        &self.acknowledgments
    }

    pub fn is_duplicate(&self) -> bool {
        self.alias == DUPLICATE_ALIAS
    }

    pub fn acknowledge(&mut self, signer: impl Into<String>, at: ObservedAt) {
        self.acknowledgments.push(Acknowledgment {
            signer: signer.into(),
            acknowledged_at: at,
        });
    }

    /// Fill in the ordinal for records written before it was stored.
    fn normalize(&mut self) {
        if self.ordinal == 0 && !self.is_duplicate() {
            self.ordinal = self.ancestors.len() as u32 + 1;
        }
    }

    /// Describe the first internal inconsistency, if any.
    fn inconsistency(&self) -> Option<String> {
        if self.ordinal as usize != self.ancestors.len() + 1 {
            return Some(format!(
                "version {} has ordinal {} but {} ancestors",
                self.current_blob.id,
                self.ordinal,
                self.ancestors.len()
            ));
        }
        let first = self.ancestors.first().unwrap_or(&self.current_blob);
        if !first.same_content(&self.origin_blob) {
            return Some(format!(
                "version {} has origin {} but its lineage starts at {}",
                self.current_blob.id, self.origin_blob.id, first.id
            ));
        }
        None
    }
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_contract_name() -> String {
    DEFAULT_CONTRACT_NAME.into()
}

/// A document owned by a client, holding one or more version lineages.
///
/// Versions are kept in creation order. Independent lineages within the same
/// contract are distinguished by their origin blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    #[serde(default = "default_contract_name")]
    pub name: String,
    #[serde(default)]
    versions: Vec<VersionLineageRecord>,
}

impl Contract {
    pub fn new(contract_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            name: name.into(),
            versions: Vec::new(),
        }
    }

    /// A copy of this contract carrying only `versions`.
    ///
    /// Used for query results; the versions are not re-validated.
    pub fn projection(&self, versions: Vec<VersionLineageRecord>) -> Self {
        Self {
            contract_id: self.contract_id.clone(),
            name: self.name.clone(),
            versions,
        }
    }

    pub fn versions(&self) -> &[VersionLineageRecord] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Index of the first version whose current blob is `id`.
    pub fn position_of(&self, id: &BlobId) -> Option<usize> {
        self.versions.iter().position(|v| v.current_blob.id == *id)
    }

    pub fn version(&self, id: &BlobId) -> Option<&VersionLineageRecord> {
        self.versions.iter().find(|v| v.current_blob.id == *id)
    }

    pub fn version_mut(&mut self, id: &BlobId) -> Option<&mut VersionLineageRecord> {
        self.versions.iter_mut().find(|v| v.current_blob.id == *id)
    }

    /// The version created directly from `id`, if the lineage has advanced
    /// past it.
    pub fn successor_of(&self, id: &BlobId) -> Option<&VersionLineageRecord> {
        self.versions
            .iter()
            .find(|v| v.parent().is_some_and(|p| p.id == *id))
    }

    /// All versions descending from `origin`, in creation order.
    pub fn lineage(&self, origin: &BlobId) -> Vec<&VersionLineageRecord> {
        self.versions
            .iter()
            .filter(|v| v.origin_blob.id == *origin)
            .collect()
    }

    /// Distinct lineage origins in order of first appearance.
    pub fn origins(&self) -> Vec<&BlobId> {
        let mut origins: Vec<&BlobId> = Vec::new();
        for v in &self.versions {
            if !origins.contains(&&v.origin_blob.id) {
                origins.push(&v.origin_blob.id);
            }
        }
        origins
    }

    /// Append a version, enforcing the lineage invariants.
    ///
    /// A genesis record must not reuse a blob already present in the
    /// contract. Any other record must extend an existing version of the same
    /// origin by exactly one step, and that version must not already have a
    /// successor.
    pub fn append(&mut self, record: VersionLineageRecord) -> Result<(), TypeError> {
        if record.is_duplicate() {
            return Err(self.violation("duplicate records are never attached"));
        }
        if let Some(reason) = record.inconsistency() {
            return Err(self.violation(reason));
        }
        if self.position_of(&record.current_blob.id).is_some() {
            return Err(self.violation(format!(
                "blob {} is already a version of this contract",
                record.current_blob.id
            )));
        }

        if let Some(parent) = record.parent() {
            let base = self.version(&parent.id).ok_or_else(|| {
                self.violation(format!("base version {} is not in this contract", parent.id))
            })?;
            if !base.origin_blob.same_content(&record.origin_blob) {
                return Err(self.violation(format!(
                    "base version {} belongs to lineage {}, not {}",
                    parent.id, base.origin_blob.id, record.origin_blob.id
                )));
            }
            let extends_base = record.ancestors.len() == base.ancestors.len() + 1
                && base
                    .ancestors
                    .iter()
                    .zip(record.ancestors.iter())
                    .all(|(a, b)| a.same_content(b));
            if !extends_base {
                return Err(self.violation(format!(
                    "ancestors of {} do not extend those of {}",
                    record.current_blob.id, parent.id
                )));
            }
            if let Some(existing) = self.successor_of(&parent.id) {
                return Err(self.violation(format!(
                    "base version {} already advanced to {}",
                    parent.id, existing.current_blob.id
                )));
            }
        }

        self.versions.push(record);
        Ok(())
    }

    fn violation(&self, reason: impl Into<String>) -> TypeError {
        TypeError::LineageViolation {
            contract_id: self.contract_id.clone(),
            reason: reason.into(),
        }
    }
}

/// Where a version lives inside a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionLocation {
    pub contract_index: usize,
    pub version_index: usize,
}

/// A client and the contracts it exclusively owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

impl Client {
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            contracts: Vec::new(),
        }
    }

    pub fn contract(&self, contract_id: &str) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.contract_id == contract_id)
    }

    pub fn contract_mut(&mut self, contract_id: &str) -> Option<&mut Contract> {
        self.contracts
            .iter_mut()
            .find(|c| c.contract_id == contract_id)
    }

    /// Add a contract, rejecting a contract id the client already owns.
    pub fn insert_contract(&mut self, contract: Contract) -> Result<&mut Contract, TypeError> {
        if self.contract(&contract.contract_id).is_some() {
            return Err(TypeError::Duplicate {
                kind: "contract",
                id: contract.contract_id,
            });
        }
        self.contracts.push(contract);
        let last = self.contracts.len() - 1;
        Ok(&mut self.contracts[last])
    }

    /// Find a version by blob id across all contracts. First match wins.
    pub fn locate_version(&self, id: &BlobId) -> Option<VersionLocation> {
        self.contracts
            .iter()
            .enumerate()
            .find_map(|(contract_index, contract)| {
                contract.position_of(id).map(|version_index| VersionLocation {
                    contract_index,
                    version_index,
                })
            })
    }

    pub fn version_at(&self, location: VersionLocation) -> Option<&VersionLineageRecord> {
        self.contracts
            .get(location.contract_index)?
            .versions
            .get(location.version_index)
    }
}

/// Root aggregate persisted as a single durable document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStore {
    /// Incremented on every successful commit.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub clients: Vec<Client>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self, client_id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.client_id == client_id)
    }

    pub fn client_mut(&mut self, client_id: &str) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.client_id == client_id)
    }

    /// Add a client, rejecting an id that is already registered.
    pub fn insert_client(&mut self, client: Client) -> Result<&mut Client, TypeError> {
        if self.client(&client.client_id).is_some() {
            return Err(TypeError::Duplicate {
                kind: "client",
                id: client.client_id,
            });
        }
        self.clients.push(client);
        let last = self.clients.len() - 1;
        Ok(&mut self.clients[last])
    }

    /// Bring records loaded from older documents up to the current shape.
    pub fn normalize(&mut self) {
        for client in &mut self.clients {
            for contract in &mut client.contracts {
                for version in &mut contract.versions {
                    version.normalize();
                }
            }
        }
    }

    /// Every lineage inconsistency found in the aggregate, formatted as
    /// `client/contract: reason`.
    pub fn lineage_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for client in &self.clients {
            for contract in &client.contracts {
                for version in &contract.versions {
                    if let Some(reason) = version.inconsistency() {
                        issues.push(format!(
                            "{}/{}: {reason}",
                            client.client_id, contract.contract_id
                        ));
                    }
                }
            }
        }
        issues
    }
}
