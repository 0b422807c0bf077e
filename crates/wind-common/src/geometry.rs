//! Box containment and boundary computation over [`Spot`]s.
//!
//! A box is given by its corner spots: 8 corners for a box at a single
//! instant (longitude × latitude × altitude) or 16 corners for a box that
//! also spans time. Corners are every combination of {low, high} per axis.
//!
//! Longitude wraparound at ±180° is not handled: margins are plain
//! arithmetic, so a boundary near the antimeridian may be inverted or too
//! narrow. [`Boundary::crosses_antimeridian`] reports that case.

use serde::{Deserialize, Serialize};

use crate::wind::{ALTITUDE_HIGH, ALTITUDE_LOW};
use crate::Spot;

const TIME_BIT: usize = 8;
const LON_BIT: usize = 4;
const LAT_BIT: usize = 2;
const ALT_BIT: usize = 1;

/// Returns true if `point` lies inside the box described by `corners`.
///
/// The corners are sorted with the [`Spot`] total order and decomposed by
/// index into lower/upper groups per axis. The point must be at least every
/// coordinate of the lower group and at most every coordinate of the upper
/// group, on every axis. Bounds are inclusive. Corner counts other than 8
/// or 16 describe no box and yield `false`.
pub fn is_inside(point: &Spot, corners: &[Spot]) -> bool {
    let mut sorted = corners.to_vec();
    sorted.sort();

    match sorted.len() {
        16 => {
            within_groups(&sorted, TIME_BIT, |s| s.time, point.time)
                && within_groups(&sorted, LON_BIT, |s| s.longitude, point.longitude)
                && within_groups(&sorted, LAT_BIT, |s| s.latitude, point.latitude)
                && within_groups(&sorted, ALT_BIT, |s| s.altitude, point.altitude)
        }
        8 => {
            // a single-instant box: time is bounded by all corners together
            sorted.iter().all(|c| point.time >= c.time)
                && sorted.iter().all(|c| point.time <= c.time)
                && within_groups(&sorted, LON_BIT, |s| s.longitude, point.longitude)
                && within_groups(&sorted, LAT_BIT, |s| s.latitude, point.latitude)
                && within_groups(&sorted, ALT_BIT, |s| s.altitude, point.altitude)
        }
        _ => false,
    }
}

/// Exact complement of [`is_inside`].
pub fn is_outside(point: &Spot, corners: &[Spot]) -> bool {
    !is_inside(point, corners)
}

fn within_groups<T, F>(sorted: &[Spot], bit: usize, key: F, value: T) -> bool
where
    T: PartialOrd,
    F: Fn(&Spot) -> T,
{
    sorted.iter().enumerate().all(|(index, corner)| {
        if index & bit == 0 {
            value >= key(corner)
        } else {
            value <= key(corner)
        }
    })
}

/// Axis-aligned longitude/latitude/altitude boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub lon_low: f64,
    pub lon_high: f64,
    pub lat_low: f64,
    pub lat_high: f64,
    pub alt_low: f64,
    pub alt_high: f64,
}

impl Boundary {
    /// Check if a horizontal position lies within this boundary (inclusive).
    pub fn contains_position(&self, longitude: f64, latitude: f64) -> bool {
        longitude >= self.lon_low
            && longitude <= self.lon_high
            && latitude >= self.lat_low
            && latitude <= self.lat_high
    }

    /// True when the longitude range leaves [-180, 180] or is inverted.
    pub fn crosses_antimeridian(&self) -> bool {
        self.lon_low < -180.0 || self.lon_high > 180.0 || self.lon_low > self.lon_high
    }
}

/// Boundary of `point ± margin` horizontally, spanning the fixed altitude range.
pub fn surrounding_boundary(point: &Spot, lon_margin: f64, lat_margin: f64) -> Boundary {
    Boundary {
        lon_low: point.longitude - lon_margin,
        lon_high: point.longitude + lon_margin,
        lat_low: point.latitude - lat_margin,
        lat_high: point.latitude + lat_margin,
        alt_low: ALTITUDE_LOW,
        alt_high: ALTITUDE_HIGH,
    }
}
