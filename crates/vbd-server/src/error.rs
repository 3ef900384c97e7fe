use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vbd_core::{DirectoryError, ErrorKind, Missing};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request could not be extracted; carries the extractor's status.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Body of every failed request.
#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub status: &'static str,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Missing>,
    pub retryable: bool,
    pub message: String,
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Directory(e) => e.kind(),
            Self::BadRequest(_) | Self::Rejected { .. } | Self::Config(_) => {
                ErrorKind::Validation
            }
            Self::Io(_) | Self::Internal(_) => ErrorKind::StorageUnavailable,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Internal(_) => return StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rejected { status, .. } => return *status,
            _ => {}
        }
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ExternalStore => StatusCode::BAD_GATEWAY,
            ErrorKind::ExternalStoreTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::StorageUnavailable | ErrorKind::StorageTimeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::StorageCorruption | ErrorKind::CommitFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_failure(&self) -> FailureResponse {
        let (missing, retryable) = match self {
            Self::Directory(e) => (e.missing(), e.is_retryable()),
            Self::Io(_) => (None, true),
            _ => (None, false),
        };
        FailureResponse {
            status: "fail",
            kind: self.kind(),
            missing,
            retryable,
            message: self.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(self.to_failure())).into_response()
    }
}

impl From<BytesRejection> for ServerError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vbd_core::BlobId;

    #[test]
    fn not_found_maps_to_404_with_missing() {
        let err = ServerError::from(DirectoryError::VersionNotFound(BlobId::new("b9").unwrap()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let failure = serde_json::to_value(err.to_failure()).unwrap();
        assert_eq!(failure["status"], "fail");
        assert_eq!(failure["kind"], "not_found");
        assert_eq!(failure["missing"], "version");
        assert_eq!(failure["retryable"], false);
    }

    #[test]
    fn timeouts_and_conflicts() {
        let err = ServerError::from(DirectoryError::ExternalStoreTimeout(
            std::time::Duration::from_secs(1),
        ));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.to_failure().retryable);

        let err = ServerError::from(DirectoryError::VersionConflict {
            base: BlobId::new("b0").unwrap(),
            successor: BlobId::new("b1").unwrap(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let failure = serde_json::to_value(err.to_failure()).unwrap();
        assert!(failure.get("missing").is_none());
        assert_eq!(failure["retryable"], true);
    }

    #[test]
    fn bad_request_is_validation() {
        let err = ServerError::BadRequest("empty body".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_failure().kind, ErrorKind::Validation);
        assert_eq!(err.to_failure().message, "bad request: empty body");
    }

    #[test]
    fn rejection_keeps_its_status() {
        let err = ServerError::Rejected {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".into(),
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        let failure = serde_json::to_value(err.to_failure()).unwrap();
        assert_eq!(failure["status"], "fail");
        assert_eq!(failure["kind"], "validation");
        assert_eq!(failure["message"], "length limit exceeded");
    }
}
