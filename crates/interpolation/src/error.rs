//! Error types for the interpolation crate.

use thiserror::Error;

/// Errors that can occur while fitting or evaluating a model.
#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("No training samples for {0} component")]
    EmptyTrainingSet(&'static str),

    #[error("Point {0:?} lies outside the sampled domain")]
    OutOfDomain([f64; 4]),

    #[error("Point {0:?} touches a grid node without a sample")]
    MissingNode([f64; 4]),

    #[error("Sample grid too large: {0} nodes")]
    GridTooLarge(usize),

    #[error("Kernel system could not be solved: {0}")]
    Singular(String),
}

/// Result type for interpolation operations.
pub type Result<T> = std::result::Result<T, InterpolationError>;
