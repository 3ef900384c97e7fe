//! Directory configuration, loadable from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vbd_blobstore::{RedundancyHint, WalrusCliConfig};

use crate::error::{DirectoryError, DirectoryResult};

/// How to reach the external blob store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The `walrus` executable.
    pub binary: PathBuf,
    /// Client configuration handed to every CLI invocation.
    pub config_path: PathBuf,
    /// Storage epochs requested for each new blob.
    pub epochs: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let cli = WalrusCliConfig::default();
        Self {
            binary: cli.binary,
            config_path: cli.config_path,
            epochs: RedundancyHint::default().epochs,
        }
    }
}

impl StoreConfig {
    pub fn cli(&self) -> WalrusCliConfig {
        WalrusCliConfig {
            binary: self.binary.clone(),
            config_path: self.config_path.clone(),
        }
    }

    pub fn hint(&self) -> RedundancyHint {
        RedundancyHint {
            epochs: self.epochs,
        }
    }
}

/// Everything a [`Directory`](crate::Directory) needs besides its backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// The durable metadata document.
    pub metadata_path: PathBuf,
    pub store: StoreConfig,
    /// Upper bound on one external store call.
    pub store_timeout_ms: u64,
    /// Upper bound on one metadata load or commit.
    pub storage_timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            metadata_path: PathBuf::from("local_db.json"),
            store: StoreConfig::default(),
            store_timeout_ms: 120_000,
            storage_timeout_ms: 10_000,
        }
    }
}

impl DirectoryConfig {
    pub fn from_toml_str(text: &str) -> DirectoryResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| DirectoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> DirectoryResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn validate(&self) -> DirectoryResult<()> {
        if self.store.epochs == 0 {
            return Err(DirectoryError::Config("store.epochs must be at least 1".into()));
        }
        if self.store_timeout_ms == 0 || self.storage_timeout_ms == 0 {
            return Err(DirectoryError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = DirectoryConfig::from_toml_str("").unwrap();
        assert_eq!(config, DirectoryConfig::default());
        assert_eq!(config.store.hint().epochs, 2);
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = DirectoryConfig::from_toml_str(
            r#"
            metadata_path = "/var/lib/vbd/db.json"
            store_timeout_ms = 500

            [store]
            binary = "/opt/walrus/bin/walrus"
            epochs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.metadata_path, PathBuf::from("/var/lib/vbd/db.json"));
        assert_eq!(config.store_timeout(), Duration::from_millis(500));
        assert_eq!(config.storage_timeout(), Duration::from_secs(10));
        assert_eq!(config.store.cli().binary, PathBuf::from("/opt/walrus/bin/walrus"));
        assert_eq!(config.store.config_path, PathBuf::from("client_config.yaml"));
        assert_eq!(config.store.hint().epochs, 5);
    }

    #[test]
    fn rejects_zero_epochs_and_timeouts() {
        assert!(DirectoryConfig::from_toml_str("[store]\nepochs = 0").is_err());
        assert!(DirectoryConfig::from_toml_str("storage_timeout_ms = 0").is_err());
        assert!(DirectoryConfig::from_toml_str("metadata_path = 3").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vbd.toml");
        std::fs::write(&path, "storage_timeout_ms = 250").unwrap();
        assert_eq!(
            DirectoryConfig::load(&path).unwrap().storage_timeout(),
            Duration::from_millis(250)
        );
        assert!(DirectoryConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
