//! Multilinear interpolation on the rectilinear grid spanned by the samples.
//!
//! Decoded snapshots sample a regular lon/lat grid at fixed altitude levels
//! and two instants, so the distinct coordinate values per axis form a
//! rectilinear 4D grid. Queries blend the 16 surrounding nodes; points
//! outside the grid are rejected rather than extrapolated.

use crate::error::{InterpolationError, Result};
use crate::TrainingSample;

/// Upper bound on grid nodes (lon × lat × alt × time) held in memory.
const MAX_GRID_NODES: usize = 20_000_000;

#[derive(Debug, Clone)]
pub(crate) struct LinearModel {
    axes: [Vec<f64>; 4],
    strides: [usize; 4],
    /// NaN marks nodes without a sample
    values: Vec<f64>,
}

impl LinearModel {
    pub(crate) fn fit(samples: &[TrainingSample], component: &'static str) -> Result<Self> {
        if samples.is_empty() {
            return Err(InterpolationError::EmptyTrainingSet(component));
        }

        let axes: [Vec<f64>; 4] = std::array::from_fn(|axis| {
            let mut values: Vec<f64> = samples
                .iter()
                .map(|s| s.coords()[axis])
                .filter(|v| v.is_finite())
                .collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            values
        });

        let mut strides = [1usize; 4];
        let mut nodes = 1usize;
        for axis in (0..4).rev() {
            strides[axis] = nodes;
            nodes = nodes
                .checked_mul(axes[axis].len())
                .filter(|n| *n <= MAX_GRID_NODES)
                .ok_or(InterpolationError::GridTooLarge(nodes.saturating_mul(axes[axis].len())))?;
        }

        let mut values = vec![f64::NAN; nodes];
        for sample in samples {
            let coords = sample.coords();
            let mut index = 0;
            let mut valid = true;
            for axis in 0..4 {
                match axes[axis].binary_search_by(|a| a.total_cmp(&coords[axis])) {
                    Ok(i) => index += i * strides[axis],
                    Err(_) => {
                        valid = false;
                        break;
                    }
                }
            }
            if valid {
                values[index] = sample.value;
            }
        }

        Ok(Self {
            axes,
            strides,
            values,
        })
    }

    pub(crate) fn predict(&self, point: [f64; 4]) -> Result<f64> {
        let mut cells = [(0usize, 0usize, 0.0f64); 4];
        for axis in 0..4 {
            cells[axis] = locate(&self.axes[axis], point[axis])
                .ok_or(InterpolationError::OutOfDomain(point))?;
        }

        let mut total = 0.0;
        for corner in 0..16usize {
            let mut weight = 1.0;
            let mut index = 0;
            for (axis, &(low, high, t)) in cells.iter().enumerate() {
                let upper = (corner >> (3 - axis)) & 1 == 1;
                let (node, w) = if upper { (high, t) } else { (low, 1.0 - t) };
                weight *= w;
                index += node * self.strides[axis];
            }
            if weight == 0.0 {
                continue;
            }
            let value = self.values[index];
            if value.is_nan() {
                return Err(InterpolationError::MissingNode(point));
            }
            total += weight * value;
        }
        Ok(total)
    }
}

/// Bracketing node indices and the weight of the upper node.
fn locate(axis: &[f64], x: f64) -> Option<(usize, usize, f64)> {
    let first = *axis.first()?;
    let last = *axis.last()?;
    if x.is_nan() || x < first || x > last {
        return None;
    }
    if axis.len() == 1 {
        return Some((0, 0, 0.0));
    }

    let upper = axis.partition_point(|a| *a <= x);
    if upper == axis.len() {
        return Some((axis.len() - 2, axis.len() - 1, 1.0));
    }
    let lower = upper - 1;
    let t = (x - axis[lower]) / (axis[upper] - axis[lower]);
    Some((lower, upper, t))
}
