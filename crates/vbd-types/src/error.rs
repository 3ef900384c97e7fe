use thiserror::Error;

/// Errors produced by type construction and lineage bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("invalid {field} {value:?}: {reason}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("lineage violation in contract {contract_id}: {reason}")]
    LineageViolation { contract_id: String, reason: String },

    #[error("duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
