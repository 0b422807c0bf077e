//! Four-dimensional query point.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// A point in time and space at which a wind vector is requested.
///
/// Spots are totally ordered by `time`, then `longitude`, then `latitude`,
/// then `altitude`. Floating-point fields are compared with
/// [`f64::total_cmp`], so equality is exact (no epsilon).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Spot {
    pub time: DateTime<Utc>,
    /// Degrees east
    pub longitude: f64,
    /// Degrees north
    pub latitude: f64,
    /// Meters above ground
    pub altitude: f64,
}

impl Spot {
    pub fn new(time: DateTime<Utc>, longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            time,
            longitude,
            latitude,
            altitude,
        }
    }

    /// Copy of this spot moved to another instant.
    pub fn at_time(&self, time: DateTime<Utc>) -> Self {
        Self { time, ..*self }
    }

    /// The 3-hour forecast bracket `[before, after]` containing this spot's time.
    pub fn time_bracket(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        time::bracket(self.time)
    }

    /// Coordinates as an `[lon, lat, alt]` triple.
    pub fn position(&self) -> [f64; 3] {
        [self.longitude, self.latitude, self.altitude]
    }
}

impl PartialEq for Spot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Spot {}

impl PartialOrd for Spot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Spot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.longitude.total_cmp(&other.longitude))
            .then_with(|| self.latitude.total_cmp(&other.latitude))
            .then_with(|| self.altitude.total_cmp(&other.altitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_time_dominates_ordering() {
        let early = Spot::new(at(0), 100.0, 50.0, 100.0);
        let late = Spot::new(at(3), -100.0, -50.0, 10.0);
        assert!(early < late);
    }

    #[test]
    fn test_lexicographic_tie_breaks() {
        let base = Spot::new(at(0), 10.0, 20.0, 50.0);
        assert!(base < Spot::new(at(0), 10.5, 0.0, 0.0));
        assert!(base < Spot::new(at(0), 10.0, 20.5, 0.0));
        assert!(base < Spot::new(at(0), 10.0, 20.0, 50.5));
        assert_eq!(base, Spot::new(at(0), 10.0, 20.0, 50.0));
    }

    #[test]
    fn test_equality_is_exact() {
        let a = Spot::new(at(0), 10.0, 20.0, 50.0);
        let b = Spot::new(at(0), 10.0 + 1e-12, 20.0, 50.0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_at_time_keeps_position() {
        let spot = Spot::new(at(1), 10.0, 20.0, 50.0);
        let moved = spot.at_time(at(3));
        assert_eq!(moved.time, at(3));
        assert_eq!(moved.position(), spot.position());
    }

    #[test]
    fn test_time_bracket() {
        let spot = Spot::new(Utc.with_ymd_and_hms(2024, 1, 1, 4, 30, 0).unwrap(), 0.0, 0.0, 10.0);
        assert_eq!(spot.time_bracket(), (at(3), at(6)));
    }
}
