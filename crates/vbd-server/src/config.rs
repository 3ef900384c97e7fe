use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use vbd_core::DirectoryConfig;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Largest accepted upload body.
    pub max_body_bytes: usize,
    /// Serve from an in-memory blob store instead of the `walrus` CLI.
    pub memory_store: bool,
    pub directory: DirectoryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            max_body_bytes: 64 * 1024 * 1024,
            memory_store: false,
            directory: DirectoryConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config
            .directory
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_body_bytes, 64 * 1024 * 1024);
        assert!(!c.memory_store);
        assert_eq!(c.directory, DirectoryConfig::default());
    }

    #[test]
    fn toml_with_directory_table() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:9000"

            [directory]
            metadata_path = "/srv/vbd/db.json"

            [directory.store]
            epochs = 3
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.directory.metadata_path, PathBuf::from("/srv/vbd/db.json"));
        assert_eq!(c.directory.store.epochs, 3);
        assert_eq!(c.directory.storage_timeout_ms, 10_000);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = ServerConfig::from_toml_str("bind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
        assert!(ServerConfig::from_toml_str("[directory.store]\nepochs = 0").is_err());
    }
}
