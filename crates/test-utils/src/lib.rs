//! Shared test utilities for the wind service workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Approximate floating-point assertions
//! - Synthetic wind field generators
//! - Temporary storage trees with decoded distributions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{assert_approx_eq, linear_wind, TestStorage};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of wind vectors.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_wind_approx_eq;
///
/// assert_wind_approx_eq!(wind, (3.0, -1.5), 1e-9);
/// ```
#[macro_export]
macro_rules! assert_wind_approx_eq {
    ($wind:expr, ($u:expr, $v:expr), $epsilon:expr) => {{
        let wind = $wind;
        $crate::assert_approx_eq!(wind.u, $u, $epsilon);
        $crate::assert_approx_eq!(wind.v, $v, $epsilon);
    }};
}
