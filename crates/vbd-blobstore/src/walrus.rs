//! Subprocess adapter for the `walrus` CLI.
//!
//! The CLI's JSON mode reads one command document on stdin and prints one
//! response document on stdout:
//!
//! ```text
//! {"config": "<client_config.yaml>", "command": {"store": {"file": "<path>", "epochs": 2}}}
//! ```
//!
//! A store answers with either `{"newlyCreated": {"blobObject": {"blobId": ...}}}`
//! or `{"alreadyCertified": {"blobId": ...}}`. Newer CLI releases wrap the
//! answer in a one-element array under `blobStoreResult`; both shapes are
//! accepted.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use vbd_types::BlobId;

use crate::error::{BlobStoreError, BlobStoreResult};
use crate::traits::{BlobStore, RedundancyHint, StoreOutcome};

/// Where to find the CLI and its client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalrusCliConfig {
    /// The `walrus` executable (looked up on `PATH` when relative).
    pub binary: PathBuf,
    /// Client configuration file passed as `config` in every command.
    pub config_path: PathBuf,
}

impl Default for WalrusCliConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("walrus"),
            config_path: PathBuf::from("client_config.yaml"),
        }
    }
}

/// [`BlobStore`] backed by the `walrus` CLI.
///
/// Every call spawns one short-lived process. The child is killed if the
/// calling future is dropped, so a timed-out call does not leave a process
/// behind.
#[derive(Clone, Debug)]
pub struct WalrusCliStore {
    config: WalrusCliConfig,
}

impl WalrusCliStore {
    pub fn new(config: WalrusCliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalrusCliConfig {
        &self.config
    }

    fn command_document(&self, command: Value) -> Value {
        json!({
            "config": self.config.config_path,
            "command": command,
        })
    }

    /// Run one JSON command and return the process's stdout.
    async fn run_json(&self, document: Value) -> BlobStoreResult<Vec<u8>> {
        let binary = self.config.binary.display().to_string();
        debug!(binary = %binary, command = %document["command"], "invoking blob store");

        let mut child = Command::new(&self.config.binary)
            .arg("json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BlobStoreError::Launch {
                binary: binary.clone(),
                source,
            })?;

        let payload = serde_json::to_vec(&document)
            .map_err(|e| BlobStoreError::MalformedResponse(e.to_string()))?;
        let written = match child.stdin.take() {
            Some(mut stdin) => async {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            }
            .await,
            None => Ok(()),
        };

        // A child that exits early breaks the pipe; its stderr says why.
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BlobStoreError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl BlobStore for WalrusCliStore {
    async fn store(&self, data: &[u8], hint: RedundancyHint) -> BlobStoreResult<StoreOutcome> {
        // The CLI only stores files, so stage the bytes first.
        let staged = tempfile::NamedTempFile::new()?;
        tokio::fs::write(staged.path(), data).await?;

        let document = self.command_document(json!({
            "store": { "file": staged.path(), "epochs": hint.epochs }
        }));
        let stdout = self.run_json(document).await?;
        parse_store_response(&stdout)
    }

    async fn fetch(&self, id: &BlobId) -> BlobStoreResult<Vec<u8>> {
        let out = tempfile::NamedTempFile::new()?;
        let document = self.command_document(json!({
            "read": { "blobId": id, "out": out.path() }
        }));
        match self.run_json(document).await {
            Ok(_) => Ok(tokio::fs::read(out.path()).await?),
            Err(BlobStoreError::NonZeroExit { stderr, .. }) if reports_missing_blob(&stderr) => {
                Err(BlobStoreError::NotFound(id.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

/// Interpret the stdout of a `store` command.
pub fn parse_store_response(stdout: &[u8]) -> BlobStoreResult<StoreOutcome> {
    let value: Value = serde_json::from_slice(stdout)
        .map_err(|e| BlobStoreError::MalformedResponse(format!("not JSON: {e}")))?;
    let value = unwrap_store_result(value)?;

    let response: StoreResponse = serde_json::from_value(value)
        .map_err(|e| BlobStoreError::MalformedResponse(e.to_string()))?;

    let outcome = match (response.newly_created, response.already_certified) {
        (Some(created), _) => StoreOutcome::NewlyCreated(parse_id(created.blob_object.blob_id)?),
        (None, Some(certified)) => StoreOutcome::AlreadyCertified(parse_id(certified.blob_id)?),
        (None, None) => {
            return Err(BlobStoreError::MalformedResponse(
                "neither newlyCreated nor alreadyCertified present".into(),
            ))
        }
    };
    Ok(outcome)
}

fn unwrap_store_result(value: Value) -> BlobStoreResult<Value> {
    let value = match value {
        Value::Array(mut items) => {
            if items.len() != 1 {
                return Err(BlobStoreError::MalformedResponse(format!(
                    "expected one store result, got {}",
                    items.len()
                )));
            }
            items.remove(0)
        }
        other => other,
    };
    match value {
        Value::Object(mut map) if map.contains_key("blobStoreResult") => map
            .remove("blobStoreResult")
            .ok_or_else(|| BlobStoreError::MalformedResponse("missing blobStoreResult".into())),
        other => Ok(other),
    }
}

fn parse_id(raw: String) -> BlobStoreResult<BlobId> {
    BlobId::new(raw).map_err(|e| BlobStoreError::MalformedResponse(e.to_string()))
}

fn reports_missing_blob(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("not found") || stderr.contains("does not exist")
}
