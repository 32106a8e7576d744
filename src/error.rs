use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Image error: {0}")]
    ImageError(String),
    /// Already user-facing and prefixed with the provider name.
    #[error("{0}")]
    ProviderError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Credential error: {0}")]
    CredentialError(String),
    #[error("Node with id {0} not found")]
    NodeNotFound(String),
    #[error("Node with id {id} is not of type {expected}")]
    NodeKindMismatch { id: String, expected: &'static str },
    #[error("Node with id {0} does not have an image")]
    MissingImage(String),
    #[error("Node with id {0} is already being generated")]
    AlreadyProcessing(String),
    #[error("No paint session is active")]
    NoActivePaintSession,
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for WorkbenchError {
    fn from(e: std::io::Error) -> Self {
        WorkbenchError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for WorkbenchError {
    fn from(e: serde_json::Error) -> Self {
        WorkbenchError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;
