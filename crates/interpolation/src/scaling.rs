//! Min-max normalisation of sample coordinates.
//!
//! Longitude/latitude are in degrees, altitude in meters and time in
//! seconds; kernel distances are only meaningful after each axis is mapped
//! onto a common [0, 1] range.

use crate::TrainingSample;

#[derive(Debug, Clone)]
pub(crate) struct AxisScaler {
    min: [f64; 4],
    span: [f64; 4],
}

impl AxisScaler {
    pub(crate) fn fit(samples: &[TrainingSample]) -> Self {
        let mut min = [f64::INFINITY; 4];
        let mut max = [f64::NEG_INFINITY; 4];
        for sample in samples {
            for (axis, value) in sample.coords().into_iter().enumerate() {
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
        }

        let mut span = [1.0; 4];
        for axis in 0..4 {
            let width = max[axis] - min[axis];
            // constant axes contribute nothing to distances
            span[axis] = if width.is_finite() && width > 0.0 { width } else { 1.0 };
            if !min[axis].is_finite() {
                min[axis] = 0.0;
            }
        }
        Self { min, span }
    }

    pub(crate) fn scale(&self, point: [f64; 4]) -> [f64; 4] {
        let mut out = [0.0; 4];
        for axis in 0..4 {
            out[axis] = (point[axis] - self.min[axis]) / self.span[axis];
        }
        out
    }
}

pub(crate) fn squared_distance(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
