//! Error types for the PDF resilience core

use thiserror::Error;

/// Result type alias for the PDF resilience core
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the object cache when it cannot accept an entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A single object is larger than the whole byte budget
    #[error("Object of {size} bytes exceeds cache capacity of {max_size} bytes")]
    ObjectTooLarge { size: u64, max_size: u64 },

    /// Every eviction candidate was removed and there is still no room.
    /// Oversized objects are reported as `ObjectTooLarge` before eviction
    /// starts.
    #[error("Eviction exhausted: needed {needed} bytes, {available} available")]
    EvictionExhausted { needed: u64, available: u64 },

    /// The cache was configured to hold no objects at all
    #[error("Cache has zero object capacity")]
    ZeroCapacity,
}

/// Error types for the PDF resilience core
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Path exists but is not a directory
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// Object cache rejected an entry
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Background task failed to join
    #[error("Task join error: {reason}")]
    TaskJoin { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::NotADirectory { .. } => "Not a directory".to_string(),
            Error::Cache(CacheError::ObjectTooLarge { max_size, .. }) => {
                format!("Object exceeds cache capacity of {} bytes", max_size)
            }
            Error::Cache(_) => "Cache is full".to_string(),
            Error::InvalidConfig { reason } => format!("Invalid configuration: {}", reason),
            Error::TaskJoin { .. } => "Internal error".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
        }
    }
}
