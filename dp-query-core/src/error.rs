//! Tagged error hierarchy (§7). One variant per distinguishable failure kind;
//! callers match on the variant, not the message.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DpError>;

/// Index of the sub-request that produced a [`DpError`] within a fan-out,
/// together with the variant that was raised.
#[derive(Debug, Clone)]
pub struct SubRequestFailure {
    pub sub_index: usize,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum DpError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transient transport error: {0}")]
    TransportTransient(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("fatal transport error: {0}")]
    TransportFatal(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("deadline exceeded")]
    Deadline,

    #[error("server error [{kind}]: {message}")]
    ServerError { kind: String, message: String },

    #[error("buffer closed")]
    BufferClosed,

    #[error("duplicate source '{0}' within one correlated block")]
    DuplicateSource(String),

    #[error("missing resource: {0}")]
    MissingResource(String),

    #[error("inconsistent column size for source '{source}': expected {expected}, got {actual}")]
    InconsistentColumnSize {
        source: String,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported scalar type: {0}")]
    UnsupportedType(String),

    #[error("start-time ordering violation before index {index}")]
    OrderingViolation { index: usize },

    #[error("time-domain collision between blocks {left} and {right}")]
    DomainCollision { left: usize, right: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("recovery failed for {} sub-request(s)", failures.len())]
    RecoveryError { failures: Vec<SubRequestFailure> },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
