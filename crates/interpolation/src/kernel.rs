//! Kernel regression models: Gaussian radial basis functions and
//! Gaussian process regression with fixed hyperparameters.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{InterpolationError, Result};
use crate::sample::{subsample, TrainingSample};
use crate::scaling::{squared_distance, AxisScaler};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Kernel {
    /// `exp(-(epsilon * r)^2)`
    Gaussian { epsilon: f64 },
    /// `signal_variance * exp(-r^2 / (2 * length_scale^2))`
    SquaredExponential {
        length_scale: f64,
        signal_variance: f64,
    },
}

impl Kernel {
    fn eval(&self, squared_distance: f64) -> f64 {
        match *self {
            Kernel::Gaussian { epsilon } => (-(epsilon * epsilon) * squared_distance).exp(),
            Kernel::SquaredExponential {
                length_scale,
                signal_variance,
            } => signal_variance * (-squared_distance / (2.0 * length_scale * length_scale)).exp(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Solver {
    Lu,
    Cholesky,
}

/// Fitted kernel model: `f(x) = mean + Σ w_i k(x, c_i)`.
#[derive(Debug, Clone)]
pub(crate) struct KernelModel {
    kernel: Kernel,
    scaler: AxisScaler,
    centers: Vec<[f64; 4]>,
    weights: DVector<f64>,
    mean: f64,
}

impl KernelModel {
    /// Solve `(K + diagonal * I) w = y - mean` over at most `max_samples` centers.
    pub(crate) fn fit(
        samples: &[TrainingSample],
        kernel: Kernel,
        diagonal: f64,
        solver: Solver,
        max_samples: usize,
        component: &'static str,
    ) -> Result<Self> {
        let samples: Vec<TrainingSample> = subsample(samples, max_samples)
            .into_iter()
            .filter(|s| s.value.is_finite())
            .collect();
        if samples.is_empty() {
            return Err(InterpolationError::EmptyTrainingSet(component));
        }

        let scaler = AxisScaler::fit(&samples);
        let centers: Vec<[f64; 4]> = samples.iter().map(|s| scaler.scale(s.coords())).collect();
        let n = centers.len();
        let mean = samples.iter().map(|s| s.value).sum::<f64>() / n as f64;
        let targets = DVector::from_iterator(n, samples.iter().map(|s| s.value - mean));

        let gram = DMatrix::from_fn(n, n, |i, j| {
            let k = kernel.eval(squared_distance(&centers[i], &centers[j]));
            if i == j {
                k + diagonal
            } else {
                k
            }
        });

        let weights = match solver {
            Solver::Lu => gram.lu().solve(&targets),
            Solver::Cholesky => gram.cholesky().map(|c| c.solve(&targets)),
        }
        .ok_or_else(|| {
            InterpolationError::Singular(format!("{component} component, {n} centers"))
        })?;

        debug!(component = component, centers = n, "Fitted kernel model");

        Ok(Self {
            kernel,
            scaler,
            centers,
            weights,
            mean,
        })
    }

    pub(crate) fn predict(&self, point: [f64; 4]) -> f64 {
        let x = self.scaler.scale(point);
        self.centers
            .iter()
            .zip(self.weights.iter())
            .map(|(c, w)| w * self.kernel.eval(squared_distance(&x, c)))
            .sum::<f64>()
            + self.mean
    }
}
