//! Wind vectors, components and the fixed altitude levels of decoded snapshots.

use serde::{Deserialize, Serialize};

use crate::Spot;

/// Horizontal wind vector in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindVector {
    /// Eastward component
    pub u: f64,
    /// Northward component
    pub v: f64,
}

impl WindVector {
    pub fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    /// Wind speed in m/s.
    pub fn speed(&self) -> f64 {
        self.u.hypot(self.v)
    }

    /// Meteorological direction in degrees: where the wind blows from, clockwise from north.
    pub fn direction_from(&self) -> f64 {
        (self.u.atan2(self.v).to_degrees() + 180.0).rem_euclid(360.0)
    }
}

/// Wind component stored in separate decoded tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindComponent {
    U,
    V,
}

impl WindComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindComponent::U => "u",
            WindComponent::V => "v",
        }
    }
}

/// A height-above-ground level present in every decoded snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AltitudeLevel(pub u32);

impl AltitudeLevel {
    /// Altitude in meters.
    pub fn meters(&self) -> f64 {
        self.0 as f64
    }

    /// Level name used in decoded file names, e.g. `10_m`.
    pub fn name(&self) -> String {
        format!("{}_m", self.0)
    }

    /// Decoded table file name for a component, e.g. `10_m_uWind.csv`.
    pub fn table_file_name(&self, component: WindComponent) -> String {
        format!("{}_{}Wind.csv", self.name(), component.as_str())
    }
}

/// Fixed, ordered altitude levels (meters above ground).
pub const ALTITUDE_LEVELS: [AltitudeLevel; 7] = [
    AltitudeLevel(10),
    AltitudeLevel(20),
    AltitudeLevel(30),
    AltitudeLevel(40),
    AltitudeLevel(50),
    AltitudeLevel(80),
    AltitudeLevel(100),
];

/// Lowest altitude covered by a snapshot.
pub const ALTITUDE_LOW: f64 = 10.0;

/// Highest altitude covered by a snapshot.
pub const ALTITUDE_HIGH: f64 = 100.0;

/// Current spatial focus of the vehicle, published to background workers as one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

impl FocusPoint {
    pub fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
        }
    }
}

impl From<&Spot> for FocusPoint {
    fn from(spot: &Spot) -> Self {
        Self::new(spot.longitude, spot.latitude, spot.altitude)
    }
}

impl Default for FocusPoint {
    fn default() -> Self {
        Self::new(139.6, 35.48, 50.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_file_names() {
        assert_eq!(ALTITUDE_LEVELS[0].table_file_name(WindComponent::U), "10_m_uWind.csv");
        assert_eq!(ALTITUDE_LEVELS[6].table_file_name(WindComponent::V), "100_m_vWind.csv");
    }

    #[test]
    fn test_levels_are_ordered_within_bounds() {
        assert!(ALTITUDE_LEVELS.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(ALTITUDE_LEVELS[0].meters(), ALTITUDE_LOW);
        assert_eq!(ALTITUDE_LEVELS[6].meters(), ALTITUDE_HIGH);
    }

    #[test]
    fn test_speed_and_direction() {
        let westerly = WindVector::new(5.0, 0.0);
        assert_eq!(westerly.speed(), 5.0);
        assert!((westerly.direction_from() - 270.0).abs() < 1e-9);

        let southerly = WindVector::new(0.0, 3.0);
        assert!((southerly.direction_from() - 180.0).abs() < 1e-9);
    }
}
