use thiserror::Error;

/// Errors returned by object stage operations.
#[derive(Debug, Error)]
pub enum StageError {
    /// No object exists under the key.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The key has already been written; the stage is write-once.
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    /// The credential does not exist, was already used, or belongs to another key.
    #[error("Invalid upload credential for key {0}")]
    CredentialInvalid(String),

    /// The credential's lifetime has elapsed.
    #[error("Upload credential expired for key {0}")]
    CredentialExpired(String),

    /// A storage backend failure.
    #[error("Stage backend error: {0}")]
    Backend(String),
}

/// Result type for stage operations.
pub type Result<T> = std::result::Result<T, StageError>;
