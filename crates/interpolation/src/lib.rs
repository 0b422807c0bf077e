//! Interpolation strategies for wind fields sampled over
//! longitude × latitude × altitude × time.
//!
//! A strategy is fitted once from the u- and v-component training samples of
//! two bracketing snapshots, then queried at arbitrary points inside the
//! sampled region. Which strategy is active is a configuration choice:
//!
//! - [`InterpolationStrategy::Linear`]: multilinear interpolation on the
//!   rectilinear sample grid
//! - [`InterpolationStrategy::RadialBasis`]: Gaussian radial basis functions
//! - [`InterpolationStrategy::GaussianProcess`]: GP regression posterior mean

pub mod error;
mod kernel;
mod linear;
pub mod sample;
mod scaling;
pub mod strategy;

pub use error::{InterpolationError, Result};
pub use sample::TrainingSample;
pub use strategy::{FittedModel, InterpolationStrategy};
