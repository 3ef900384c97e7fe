//! HTTP server for the Versioned Blob Directory.
//!
//! Exposes client listing and registration, contract creation, version
//! uploads, history queries, content fetches and signature acknowledgments
//! over JSON. Upload bodies carry the raw file bytes. Every failure is
//! answered with a `{"status": "fail", ...}` document.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{FailureResponse, ServerError, ServerResult};
pub use handler::AppState;
pub use server::{directory_for, VbdServer};
