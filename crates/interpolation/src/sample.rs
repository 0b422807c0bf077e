//! Training samples extracted from decoded snapshots.

/// One observed wind component value at a 4D location.
///
/// `time_offset` is measured in seconds from the earlier snapshot of the
/// bracket, so samples of the later snapshot carry the bracket length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    pub time_offset: f64,
    pub value: f64,
}

impl TrainingSample {
    pub fn new(longitude: f64, latitude: f64, altitude: f64, time_offset: f64, value: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
            time_offset,
            value,
        }
    }

    /// Coordinates as `[lon, lat, alt, time_offset]`.
    pub fn coords(&self) -> [f64; 4] {
        [self.longitude, self.latitude, self.altitude, self.time_offset]
    }
}

/// Keep at most `max` samples, taking a uniform stride through the input.
pub(crate) fn subsample(samples: &[TrainingSample], max: usize) -> Vec<TrainingSample> {
    if max == 0 || samples.len() <= max {
        return samples.to_vec();
    }
    let stride = samples.len().div_ceil(max);
    samples.iter().step_by(stride).copied().collect()
}
