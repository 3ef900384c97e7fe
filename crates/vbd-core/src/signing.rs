//! Signature acknowledgments on committed versions.
//!
//! Acknowledging records who signed which version. Signer identity is taken
//! as given; nothing here authenticates it.

use serde::{Deserialize, Serialize};
use vbd_types::{BlobId, MetadataStore, ObservedAt};

use crate::error::{DirectoryError, DirectoryResult};
use crate::upload::{client_mut, contract_mut};

/// Identifies the version being signed and who signs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub client_id: String,
    pub contract_id: String,
    #[serde(alias = "version_id")]
    pub version_blob_id: BlobId,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignatureReceipt {
    pub client_id: String,
    pub contract_id: String,
    pub blob_id: BlobId,
    pub signer: String,
    pub acknowledged_at: ObservedAt,
    pub message: String,
}

/// Record the acknowledgment on the resolved version.
///
/// Resolution checks client, then contract, then version, and reports the
/// first step that fails.
pub fn acknowledge(
    store: &mut MetadataStore,
    request: &SignatureRequest,
    at: ObservedAt,
) -> DirectoryResult<SignatureReceipt> {
    if request.signer.trim().is_empty() {
        return Err(DirectoryError::Validation("signer must not be empty".into()));
    }
    let client = client_mut(store, &request.client_id)?;
    let contract = contract_mut(client, &request.contract_id)?;
    let version = contract
        .version_mut(&request.version_blob_id)
        .ok_or_else(|| DirectoryError::VersionNotFound(request.version_blob_id.clone()))?;
    version.acknowledge(request.signer.clone(), at);

    Ok(SignatureReceipt {
        client_id: request.client_id.clone(),
        contract_id: request.contract_id.clone(),
        blob_id: request.version_blob_id.clone(),
        signer: request.signer.clone(),
        acknowledged_at: at,
        message: format!("{} has signed {}.", request.signer, request.version_blob_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Missing;
    use vbd_types::{BlobIdentifier, Client, Contract, VersionLineageRecord};

    fn store() -> MetadataStore {
        let mut contract = Contract::new("K1", "lease");
        contract
            .append(VersionLineageRecord::genesis(
                BlobIdentifier::new(BlobId::new("b0").unwrap(), ObservedAt::from_millis(10)),
                "draft",
            ))
            .unwrap();
        let mut store = MetadataStore::new();
        store
            .insert_client(Client::new("C1", "Acme"))
            .unwrap()
            .insert_contract(contract)
            .unwrap();
        store
    }

    fn request(client: &str, contract: &str, version: &str) -> SignatureRequest {
        SignatureRequest {
            client_id: client.into(),
            contract_id: contract.into(),
            version_blob_id: BlobId::new(version).unwrap(),
            signer: "alice".into(),
        }
    }

    #[test]
    fn acknowledgment_is_recorded() {
        let mut store = store();
        let at = ObservedAt::from_millis(99);
        let receipt = acknowledge(&mut store, &request("C1", "K1", "b0"), at).unwrap();
        assert_eq!(receipt.message, "alice has signed b0.");

        let version = &store.client("C1").unwrap().contract("K1").unwrap().versions()[0];
        assert_eq!(version.acknowledgments().len(), 1);
        assert_eq!(version.acknowledgments()[0].signer, "alice");
        assert_eq!(version.acknowledgments()[0].acknowledged_at, at);
    }

    #[test]
    fn first_failing_step_is_reported() {
        let at = ObservedAt::from_millis(1);
        let cases = [
            (request("C9", "K9", "b9"), Missing::Client),
            (request("C1", "K9", "b9"), Missing::Contract),
            (request("C1", "K1", "b9"), Missing::Version),
        ];
        for (req, missing) in cases {
            let mut store = store();
            let before = store.clone();
            let err = acknowledge(&mut store, &req, at).unwrap_err();
            assert_eq!(err.missing(), Some(missing));
            assert_eq!(store, before);
        }
    }

    #[test]
    fn request_accepts_version_id_alias() {
        let req: SignatureRequest = serde_json::from_str(
            r#"{"client_id":"C1","contract_id":"K1","version_id":"b0","signer":"bob"}"#,
        )
        .unwrap();
        assert_eq!(req.version_blob_id, "b0");
        assert!(acknowledge(&mut store(), &req, ObservedAt::from_millis(1)).is_ok());

        let mut blank = req;
        blank.signer = "  ".into();
        assert!(matches!(
            acknowledge(&mut store(), &blank, ObservedAt::from_millis(1)),
            Err(DirectoryError::Validation(_))
        ));
    }
}
