//! Error types for the acquisition crate.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to probe or fetch one forecast part from the distribution server.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not published yet: {0}")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Transfer truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether probing should move on to the previous publication.
    ///
    /// Every network-side failure steps back. Local failures (I/O, a
    /// truncated body) keep the same publication and wait before probing
    /// again.
    pub fn steps_back(&self) -> bool {
        matches!(
            self,
            SourceError::NotFound(_)
                | SourceError::Timeout(_)
                | SourceError::HttpStatus { .. }
                | SourceError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured duration
            SourceError::Timeout(std::time::Duration::ZERO)
        } else if let Some(status) = e.status() {
            SourceError::HttpStatus {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// Failure of the external decoder on one part file.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to start decoder {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoder exited with {status} on {input}: {stderr}")]
    Failed {
        input: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors of one download or decode cycle. Loops log these and carry on.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Storage error: {0}")]
    Storage(#[from] wind_common::WindError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AcquisitionError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| AcquisitionError::Io { path, source }
    }
}

/// Result type for one acquisition cycle.
pub type Result<T> = std::result::Result<T, AcquisitionError>;
