//! Synthetic wind fields for creating predictable decoded tables.
//!
//! Every generator returns a closure `(lon, lat, alt) -> (u, v)` so tests can
//! compute the exact expected value at any grid node and check what comes
//! back out of a snapshot or an interpolation model.

/// Wind field sampled at one instant: `(lon, lat, alt) -> (u, v)`.
pub trait WindField: Fn(f64, f64, f64) -> (f64, f64) {}

impl<F: Fn(f64, f64, f64) -> (f64, f64)> WindField for F {}

/// The same vector everywhere.
///
/// ```
/// use test_utils::constant_wind;
///
/// let field = constant_wind(3.0, -1.0);
/// assert_eq!(field(10.0, 20.0, 50.0), (3.0, -1.0));
/// ```
pub fn constant_wind(u: f64, v: f64) -> impl WindField {
    move |_, _, _| (u, v)
}

/// A field linear in every coordinate.
///
/// u grows eastward and with altitude, v grows northward. Multilinear
/// interpolation reproduces it exactly, which makes it the reference field
/// for end-to-end tests.
///
/// * `base` - (u, v) at lon = 0, lat = 0, alt = 0
pub fn linear_wind(base: (f64, f64)) -> impl WindField {
    move |lon, lat, alt| (base.0 + 0.5 * lon + 0.02 * alt, base.1 + 0.25 * lat - 0.01 * alt)
}

/// Wind shear: u increases logarithmically with height, v is calm.
pub fn sheared_wind(u_at_10m: f64) -> impl WindField {
    move |_, _, alt| (u_at_10m * (alt.max(1.0) / 10.0).ln().mul_add(0.3, 1.0), 0.0)
}

/// Evenly spaced axis values from `low` to `high` inclusive.
///
/// Values are computed by index so no floating-point drift accumulates.
///
/// ```
/// use test_utils::axis_values;
///
/// assert_eq!(axis_values(0.0, 1.0, 0.5), vec![0.0, 0.5, 1.0]);
/// ```
pub fn axis_values(low: f64, high: f64, step: f64) -> Vec<f64> {
    let steps = ((high - low) / step).round() as usize;
    (0..=steps).map(|i| low + i as f64 * step).collect()
}
