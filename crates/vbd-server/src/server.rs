use std::sync::Arc;

use tokio::net::TcpListener;
use vbd_blobstore::InMemoryBlobStore;
use vbd_core::Directory;
use vbd_metadata::FileMetadataBackend;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Versioned Blob Directory HTTP server.
pub struct VbdServer {
    config: ServerConfig,
    directory: Arc<Directory>,
}

impl VbdServer {
    pub fn new(config: ServerConfig, directory: Arc<Directory>) -> Self {
        Self { config, directory }
    }

    /// Server over the configured metadata file and blob store.
    pub fn from_config(config: ServerConfig) -> Self {
        let directory = Arc::new(directory_for(&config));
        Self::new(config, directory)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.directory.clone(), self.config.max_body_bytes)
    }

    /// Start serving requests until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            metadata = %self.config.directory.metadata_path.display(),
            memory_store = self.config.memory_store,
            "VBD server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// The directory described by `config`: file-backed metadata over either the
/// `walrus` CLI or, with `memory_store`, a process-local blob store.
pub fn directory_for(config: &ServerConfig) -> Directory {
    if config.memory_store {
        let metadata = Arc::new(FileMetadataBackend::new(
            config.directory.metadata_path.clone(),
        ));
        Directory::with_config(metadata, Arc::new(InMemoryBlobStore::new()), &config.directory)
    } else {
        Directory::from_config(&config.directory)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
