//! Error types for wind field services.

use thiserror::Error;

/// Result type alias using WindError.
pub type WindResult<T> = Result<T, WindError>;

/// Primary error type for wind queries.
#[derive(Debug, Error)]
pub enum WindError {
    // === Data Errors ===
    #[error("Data not available: {0}")]
    DataUnavailable(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Interpolation failed: {0}")]
    Interpolation(String),

    // === Cache Errors ===
    #[error("Cache is not ready to answer: {0}")]
    CacheNotReady(String),

    // === Infrastructure Errors ===
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WindError {
    /// Whether the dispatcher may recover from this error by trying the next tier.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, WindError::Configuration(_))
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            WindError::DataUnavailable(_) => 404,
            WindError::InvalidData(_) => 422,
            WindError::CacheNotReady(_) | WindError::TransientNetwork(_) => 503,
            _ => 500,
        }
    }
}
