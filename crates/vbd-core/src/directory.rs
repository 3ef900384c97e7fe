use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vbd_blobstore::{BlobStore, RedundancyHint, StoreOutcome, WalrusCliStore};
use vbd_metadata::{FileMetadataBackend, MetadataBackend, MetadataResult};
use vbd_types::{
    BlobId, BlobIdentifier, Client, ClientSummary, Contract, MetadataStore, ObservedAt,
    QueryOptions, VersionLineageRecord,
};

use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::lock::ClientLocks;
use crate::orphan::{OrphanKey, OrphanRegistry};
use crate::query::{filter_contracts, ContractQuery};
use crate::signing::{self, SignatureReceipt, SignatureRequest};
use crate::upload::{self, UploadOutcome};

/// What a store outcome means for the lineage being extended.
enum Claim {
    /// The blob is new to the directory and should be committed.
    Fresh(BlobId),
    /// Nothing to commit; report this record.
    Duplicate(VersionLineageRecord),
}

/// Handle to a Versioned Blob Directory.
///
/// Bundles the metadata backend, the external blob store, and the locks and
/// timeouts that govern access to them. Every operation loads the latest
/// durable snapshot; nothing is cached between calls.
pub struct Directory {
    metadata: Arc<dyn MetadataBackend>,
    blobs: Arc<dyn BlobStore>,
    hint: RedundancyHint,
    store_timeout: Duration,
    storage_timeout: Duration,
    client_locks: ClientLocks,
    commit_lock: Arc<AsyncMutex<()>>,
    orphans: OrphanRegistry,
}

impl Directory {
    /// Directory over the given backends with default timeouts.
    pub fn new(metadata: Arc<dyn MetadataBackend>, blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_config(metadata, blobs, &DirectoryConfig::default())
    }

    pub fn with_config(
        metadata: Arc<dyn MetadataBackend>,
        blobs: Arc<dyn BlobStore>,
        config: &DirectoryConfig,
    ) -> Self {
        Self {
            metadata,
            blobs,
            hint: config.store.hint(),
            store_timeout: config.store_timeout(),
            storage_timeout: config.storage_timeout(),
            client_locks: ClientLocks::new(),
            commit_lock: Arc::new(AsyncMutex::new(())),
            orphans: OrphanRegistry::new(),
        }
    }

    /// File-backed metadata and the `walrus` CLI, as configured.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let metadata = Arc::new(FileMetadataBackend::new(config.metadata_path.clone()));
        let blobs = Arc::new(WalrusCliStore::new(config.store.cli()));
        Self::with_config(metadata, blobs, config)
    }

    pub fn with_timeouts(mut self, store: Duration, storage: Duration) -> Self {
        self.store_timeout = store;
        self.storage_timeout = storage;
        self
    }

    pub fn orphans(&self) -> &OrphanRegistry {
        &self.orphans
    }

    // ---- Read operations ----

    /// Every client with its contracts and version aliases.
    pub async fn list_clients(&self) -> DirectoryResult<Vec<ClientSummary>> {
        let store = self.load().await?;
        Ok(ClientSummary::all(&store))
    }

    pub async fn get_contracts(
        &self,
        client_id: &str,
        options: &QueryOptions,
    ) -> DirectoryResult<ContractQuery> {
        let store = self.load().await?;
        let client = upload::client(&store, client_id)?;
        let result = filter_contracts(client, options);
        debug!(client_id, contracts = result.contracts.len(), "contracts queried");
        Ok(result)
    }

    /// Bytes of a version owned by `client_id`.
    pub async fn fetch_version(&self, client_id: &str, blob_id: &BlobId) -> DirectoryResult<Vec<u8>> {
        let store = self.load().await?;
        let client = upload::client(&store, client_id)?;
        if !upload::is_owned(client, blob_id) {
            return Err(DirectoryError::VersionNotFound(blob_id.clone()));
        }
        match tokio::time::timeout(self.store_timeout, self.blobs.fetch(blob_id)).await {
            Ok(bytes) => Ok(bytes?),
            Err(_) => Err(DirectoryError::ExternalStoreTimeout(self.store_timeout)),
        }
    }

    /// Re-validate durable metadata, clearing a corruption latch if it now
    /// parses.
    pub async fn verify(&self) -> DirectoryResult<()> {
        let metadata = Arc::clone(&self.metadata);
        self.blocking(move || metadata.recheck()).await?;
        info!("metadata verified");
        Ok(())
    }

    // ---- Write operations ----

    /// Register a client. A UUID v7 is generated when no id is given.
    pub async fn register_client(
        &self,
        name: &str,
        client_id: Option<&str>,
    ) -> DirectoryResult<Client> {
        let client_id = match client_id {
            Some(id) => non_empty("client_id", id)?.to_string(),
            None => Uuid::now_v7().to_string(),
        };
        let client = Client::new(client_id, non_empty("name", name)?);
        let created = client.clone();
        self.commit_with(move |store| {
            store
                .insert_client(client)
                .map_err(|e| DirectoryError::Validation(e.to_string()))?;
            Ok(())
        })
        .await?;
        info!(client_id = %created.client_id, "client registered");
        Ok(created)
    }

    /// Store `bytes` and create a contract whose first version carries them.
    pub async fn create_contract(
        &self,
        client_id: &str,
        contract_id: Option<&str>,
        name: &str,
        alias: &str,
        bytes: &[u8],
    ) -> DirectoryResult<UploadOutcome> {
        let _writer = self.client_locks.acquire(client_id).await;
        let snapshot = self.load().await?;
        let client = upload::client(&snapshot, client_id)?;
        let contract_id = match contract_id {
            Some(id) => non_empty("contract_id", id)?.to_string(),
            None => Uuid::now_v7().to_string(),
        };
        if client.contract(&contract_id).is_some() {
            return Err(DirectoryError::Validation(format!(
                "contract {contract_id} already exists for client {client_id}"
            )));
        }

        let key = OrphanKey::genesis(client_id, contract_id.as_str());
        let blob = match self.claim(self.store_bytes(bytes).await?, &key, client) {
            Claim::Fresh(blob) => blob,
            Claim::Duplicate(record) => return Ok(UploadOutcome::Deduplicated(record)),
        };

        let guard = self.orphans.guard(key, blob.clone());
        let contract = Contract::new(contract_id.clone(), name);
        let observed = BlobIdentifier::observed_now(blob);
        let record = self
            .commit_with(|store| upload::insert_contract(store, client_id, contract, observed, alias))
            .await?;
        guard.committed();
        info!(client_id, contract_id = %contract_id, blob_id = %record.current_blob().id, "contract created");
        Ok(UploadOutcome::Created(record))
    }

    /// Store `bytes` as the first version of a further lineage in an
    /// existing contract.
    pub async fn start_lineage(
        &self,
        client_id: &str,
        contract_id: &str,
        alias: &str,
        bytes: &[u8],
    ) -> DirectoryResult<UploadOutcome> {
        let _writer = self.client_locks.acquire(client_id).await;
        let snapshot = self.load().await?;
        let client = upload::client(&snapshot, client_id)?;
        if client.contract(contract_id).is_none() {
            return Err(DirectoryError::ContractNotFound {
                client_id: client_id.to_string(),
                contract_id: contract_id.to_string(),
            });
        }

        let key = OrphanKey::genesis(client_id, contract_id);
        let blob = match self.claim(self.store_bytes(bytes).await?, &key, client) {
            Claim::Fresh(blob) => blob,
            Claim::Duplicate(record) => return Ok(UploadOutcome::Deduplicated(record)),
        };

        let guard = self.orphans.guard(key, blob.clone());
        let observed = BlobIdentifier::observed_now(blob);
        let record = self
            .commit_with(|store| upload::append_genesis(store, client_id, contract_id, observed, alias))
            .await?;
        guard.committed();
        info!(client_id, contract_id, blob_id = %record.current_blob().id, "lineage started");
        Ok(UploadOutcome::Created(record))
    }

    /// Read `path` and submit it as the successor of `base`.
    pub async fn upload_new_version(
        &self,
        path: &Path,
        client_id: &str,
        base: &BlobId,
    ) -> DirectoryResult<UploadOutcome> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            DirectoryError::Validation(format!("cannot read {}: {e}", path.display()))
        })?;
        self.upload_new_version_bytes(&bytes, client_id, base).await
    }

    /// Submit `bytes` as the successor of the version whose blob is `base`.
    ///
    /// Holds the client's write lock for the whole sequence. Bytes the store
    /// already holds produce [`UploadOutcome::Deduplicated`] and commit
    /// nothing.
    pub async fn upload_new_version_bytes(
        &self,
        bytes: &[u8],
        client_id: &str,
        base: &BlobId,
    ) -> DirectoryResult<UploadOutcome> {
        let _writer = self.client_locks.acquire(client_id).await;
        let snapshot = self.load().await?;
        upload::resolve_base(&snapshot, client_id, base)?;
        let client = upload::client(&snapshot, client_id)?;

        let key = OrphanKey::successor(client_id, base.clone());
        let blob = match self.claim(self.store_bytes(bytes).await?, &key, client) {
            Claim::Fresh(blob) => blob,
            Claim::Duplicate(record) => return Ok(UploadOutcome::Deduplicated(record)),
        };

        let guard = self.orphans.guard(key, blob.clone());
        let observed = BlobIdentifier::observed_now(blob);
        let record = self
            .commit_with(|store| upload::append_successor(store, client_id, base, observed))
            .await?;
        guard.committed();
        info!(
            client_id,
            base = %base,
            blob_id = %record.current_blob().id,
            ordinal = record.ordinal(),
            "version created"
        );
        Ok(UploadOutcome::Created(record))
    }

    /// Record that `request.signer` acknowledged a version.
    pub async fn acknowledge_signature(
        &self,
        request: SignatureRequest,
    ) -> DirectoryResult<SignatureReceipt> {
        let _writer = self.client_locks.acquire(&request.client_id).await;
        let receipt = self
            .commit_with(|store| signing::acknowledge(store, &request, ObservedAt::now()))
            .await?;
        info!(
            client_id = %receipt.client_id,
            contract_id = %receipt.contract_id,
            blob_id = %receipt.blob_id,
            signer = %receipt.signer,
            "signature acknowledged"
        );
        Ok(receipt)
    }

    // ---- Internals ----

    fn claim(&self, outcome: StoreOutcome, key: &OrphanKey, client: &Client) -> Claim {
        match outcome {
            StoreOutcome::NewlyCreated(blob) => Claim::Fresh(blob),
            StoreOutcome::AlreadyCertified(blob) => {
                let orphaned = self.orphans.take(key, &blob);
                if orphaned && !upload::is_owned(client, &blob) {
                    info!(client_id = %key.client_id, blob_id = %blob, "adopting orphaned blob");
                    return Claim::Fresh(blob);
                }
                warn!(
                    client_id = %key.client_id,
                    blob_id = %blob,
                    "store already holds these bytes; nothing committed"
                );
                Claim::Duplicate(upload::duplicate_record(client, &blob))
            }
        }
    }

    async fn store_bytes(&self, bytes: &[u8]) -> DirectoryResult<StoreOutcome> {
        debug!(len = bytes.len(), epochs = self.hint.epochs, "storing bytes");
        match tokio::time::timeout(self.store_timeout, self.blobs.store(bytes, self.hint)).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(DirectoryError::ExternalStoreTimeout(self.store_timeout)),
        }
    }

    async fn load(&self) -> DirectoryResult<MetadataStore> {
        let metadata = Arc::clone(&self.metadata);
        self.blocking(move || metadata.load()).await
    }

    /// Load the latest snapshot, apply `mutate`, and commit, all under the
    /// store-wide commit lock.
    ///
    /// The commit task owns the lock guard, so a commit abandoned by the
    /// storage timeout keeps the lock until it actually finishes.
    async fn commit_with<T, F>(&self, mutate: F) -> DirectoryResult<T>
    where
        F: FnOnce(&mut MetadataStore) -> DirectoryResult<T> + Send,
        T: Send,
    {
        let committer = Arc::clone(&self.commit_lock).lock_owned().await;
        let mut snapshot = self.load().await?;
        let value = mutate(&mut snapshot)?;
        let metadata = Arc::clone(&self.metadata);
        let committed = self
            .blocking(move || {
                let _committer = committer;
                metadata.commit(&snapshot)
            })
            .await?;
        debug!(revision = committed.revision, "snapshot committed");
        Ok(value)
    }

    /// Run metadata I/O on the blocking pool under the storage timeout.
    ///
    /// A timed-out task keeps running to completion in the background.
    async fn blocking<T, F>(&self, io: F) -> DirectoryResult<T>
    where
        F: FnOnce() -> MetadataResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(io);
        match tokio::time::timeout(self.storage_timeout, task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join)) => Err(DirectoryError::StorageTask(join.to_string())),
            Err(_) => Err(DirectoryError::StorageTimeout(self.storage_timeout)),
        }
    }
}

fn non_empty<'a>(field: &str, value: &'a str) -> DirectoryResult<&'a str> {
    if value.trim().is_empty() {
        return Err(DirectoryError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("hint", &self.hint)
            .field("store_timeout", &self.store_timeout)
            .field("storage_timeout", &self.storage_timeout)
            .field("orphans", &self.orphans)
            .finish()
    }
}
