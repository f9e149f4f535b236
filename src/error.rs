//! Error types for blobserver

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob over the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    /// Contract violation, e.g. writing to a spool after reading began.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The client sent bytes that could not be read as a blob.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Container {container} read ACL mismatch: expected {expected:?}, got {actual:?}")]
    AclMismatch {
        container: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("Backend error: {0}")]
    Backend(#[from] ObjectApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by a remote object store.
#[derive(Error, Debug)]
pub enum ObjectApiError {
    #[error("Object not found")]
    ObjectNotFound,

    #[error("Container not found")]
    ContainerNotFound,

    #[error("Checksum mismatch on upload")]
    ChecksumMismatch,

    #[error("Authorization failed")]
    Unauthorized,

    #[error("Unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectApiError {
    /// Both mean "the object is not there" from a reader's point of view.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound | Self::ContainerNotFound)
    }
}

#[cfg(feature = "swift")]
impl From<reqwest::Error> for ObjectApiError {
    fn from(err: reqwest::Error) -> Self {
        ObjectApiError::Transport(err.to_string())
    }
}
