use serde::{Deserialize, Serialize};

use crate::blob::BlobId;
use crate::entity::{Client, Contract, MetadataStore};

/// Alias and id of one version, as shown when listing clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub alias: String,
    pub blob_id: BlobId,
    pub ordinal: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub contract_id: String,
    pub name: String,
    pub versions: Vec<VersionSummary>,
}

/// Read-only projection of a client and its contracts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub client_id: String,
    pub name: String,
    pub contracts: Vec<ContractSummary>,
}

impl From<&Contract> for ContractSummary {
    fn from(contract: &Contract) -> Self {
        Self {
            contract_id: contract.contract_id.clone(),
            name: contract.name.clone(),
            versions: contract
                .versions()
                .iter()
                .map(|v| VersionSummary {
                    alias: v.alias().to_string(),
                    blob_id: v.current_blob().id.clone(),
                    ordinal: v.ordinal(),
                })
                .collect(),
        }
    }
}

impl From<&Client> for ClientSummary {
    fn from(client: &Client) -> Self {
        Self {
            client_id: client.client_id.clone(),
            name: client.name.clone(),
            contracts: client.contracts.iter().map(ContractSummary::from).collect(),
        }
    }
}

impl ClientSummary {
    /// Summaries of every client in the store, in stored order.
    pub fn all(store: &MetadataStore) -> Vec<Self> {
        store.clients.iter().map(Self::from).collect()
    }
}
