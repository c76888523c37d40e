//! Error type definitions for the menu cache
//!
//! The hierarchy mirrors the layers: storage and remote errors are leaf
//! errors, the optimizer and cache wrap storage errors, and `AppError`
//! wraps everything for the service layer and the binary.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Persisted key/value store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote REST store errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Image optimizer errors
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

/// Persisted key/value store errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value rejected because it exceeds the store's per-value quota
    #[error("Quota exceeded for key {key}: {size} bytes (max: {limit})")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    /// Key contains characters that cannot be mapped safely onto the backend
    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Stored value was not valid UTF-8
    #[error("Corrupt value for key {key}: {message}")]
    Corrupt { key: String, message: String },
}

/// Remote REST store errors
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failures from reqwest
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any non-2xx response
    #[error("HTTP {status} from {collection}: {message}")]
    Status {
        status: u16,
        collection: String,
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Unexpected response from {collection}: {message}")]
    Decode { collection: String, message: String },

    /// Base URL could not be joined with a collection path
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Batch image optimizer errors
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// A batch run is already in flight on this optimizer
    #[error("Operation already in progress: {operation}")]
    AlreadyRunning { operation: String },

    /// Value is not a `data:image/...;base64,` URL
    #[error("Not a base64 data URL: {message}")]
    InvalidDataUrl { message: String },

    /// Base64 payload could not be decoded
    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Image decode/encode failure
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// Blocking compression task panicked or was cancelled
    #[error("Compression task failed: {message}")]
    Task { message: String },

    /// Backup persistence failures
    #[error("Backup storage error: {0}")]
    Storage(#[from] StorageError),

    /// Backup (de)serialization failures
    #[error("Backup serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache manager errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persisted key/value store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl OptimizerError {
    /// Create an already-running error for the named operation
    pub fn already_running<S: Into<String>>(operation: S) -> Self {
        Self::AlreadyRunning {
            operation: operation.into(),
        }
    }

    /// Create an invalid data URL error
    pub fn invalid_data_url<S: Into<String>>(message: S) -> Self {
        Self::InvalidDataUrl {
            message: message.into(),
        }
    }
}

impl StorageError {
    /// Whether this error means the backend refused the value for size reasons
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
