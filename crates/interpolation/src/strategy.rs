//! Strategy selection and fitted u/v model pairs.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use wind_common::WindVector;

use crate::error::Result;
use crate::kernel::{Kernel, KernelModel, Solver};
use crate::linear::LinearModel;
use crate::TrainingSample;

fn default_max_samples() -> usize {
    2000
}

fn default_epsilon() -> f64 {
    3.0
}

fn default_smoothing() -> f64 {
    1e-8
}

fn default_length_scale() -> f64 {
    0.3
}

fn default_signal_variance() -> f64 {
    1.0
}

fn default_noise_variance() -> f64 {
    1e-4
}

/// How a wind field is interpolated between sampled points.
///
/// Deserialized from configuration, e.g.
///
/// ```yaml
/// interpolation:
///   method: radial_basis
///   epsilon: 3.0
/// ```
///
/// Kernel parameters apply to coordinates min-max scaled onto [0, 1] per axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InterpolationStrategy {
    #[default]
    Linear,
    RadialBasis {
        #[serde(default = "default_epsilon")]
        epsilon: f64,
        #[serde(default = "default_smoothing")]
        smoothing: f64,
        #[serde(default = "default_max_samples")]
        max_samples: usize,
    },
    GaussianProcess {
        #[serde(default = "default_length_scale")]
        length_scale: f64,
        #[serde(default = "default_signal_variance")]
        signal_variance: f64,
        #[serde(default = "default_noise_variance")]
        noise_variance: f64,
        #[serde(default = "default_max_samples")]
        max_samples: usize,
    },
}

impl InterpolationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            InterpolationStrategy::Linear => "linear",
            InterpolationStrategy::RadialBasis { .. } => "radial_basis",
            InterpolationStrategy::GaussianProcess { .. } => "gaussian_process",
        }
    }

    /// Fit models for both wind components; u and v are fitted in parallel.
    #[instrument(skip(self, u_samples, v_samples), fields(method = self.name(), u = u_samples.len(), v = v_samples.len()))]
    pub fn fit(
        &self,
        u_samples: &[TrainingSample],
        v_samples: &[TrainingSample],
    ) -> Result<FittedModel> {
        let (u, v) = rayon::join(
            || self.fit_component(u_samples, "u"),
            || self.fit_component(v_samples, "v"),
        );
        debug!("Fitted wind model");
        Ok(FittedModel {
            method: self.name(),
            u: u?,
            v: v?,
        })
    }

    fn fit_component(&self, samples: &[TrainingSample], component: &'static str) -> Result<ComponentModel> {
        match *self {
            InterpolationStrategy::Linear => {
                LinearModel::fit(samples, component).map(ComponentModel::Linear)
            }
            InterpolationStrategy::RadialBasis {
                epsilon,
                smoothing,
                max_samples,
            } => KernelModel::fit(
                samples,
                Kernel::Gaussian { epsilon },
                smoothing,
                Solver::Lu,
                max_samples,
                component,
            )
            .map(ComponentModel::Kernel),
            InterpolationStrategy::GaussianProcess {
                length_scale,
                signal_variance,
                noise_variance,
                max_samples,
            } => KernelModel::fit(
                samples,
                Kernel::SquaredExponential {
                    length_scale,
                    signal_variance,
                },
                noise_variance,
                Solver::Cholesky,
                max_samples,
                component,
            )
            .map(ComponentModel::Kernel),
        }
    }
}

#[derive(Debug, Clone)]
enum ComponentModel {
    Linear(LinearModel),
    Kernel(KernelModel),
}

impl ComponentModel {
    fn predict(&self, point: [f64; 4]) -> Result<f64> {
        match self {
            ComponentModel::Linear(model) => model.predict(point),
            ComponentModel::Kernel(model) => Ok(model.predict(point)),
        }
    }
}

/// A pair of fitted u/v models, queried at `[lon, lat, alt, seconds]`.
#[derive(Debug, Clone)]
pub struct FittedModel {
    method: &'static str,
    u: ComponentModel,
    v: ComponentModel,
}

impl FittedModel {
    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn predict(&self, point: [f64; 4]) -> Result<WindVector> {
        Ok(WindVector::new(self.u.predict(point)?, self.v.predict(point)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InterpolationError;
    use test_utils::assert_approx_eq;

    fn grid(f: impl Fn(f64, f64, f64, f64) -> f64) -> Vec<TrainingSample> {
        let mut samples = Vec::new();
        for t in [0.0, 10800.0] {
            for alt in [10.0, 50.0, 100.0] {
                for lat in [40.0, 40.5, 41.0] {
                    for lon in [0.0, 0.5, 1.0] {
                        samples.push(TrainingSample::new(lon, lat, alt, t, f(lon, lat, alt, t)));
                    }
                }
            }
        }
        samples
    }

    #[test]
    fn test_linear_fit_predicts_both_components() {
        let u = grid(|lon, _, _, _| 2.0 * lon);
        let v = grid(|_, lat, _, t| lat - 40.0 + t / 10800.0);
        let model = InterpolationStrategy::Linear.fit(&u, &v).unwrap();
        let wind = model.predict([0.25, 40.5, 50.0, 5400.0]).unwrap();
        assert_approx_eq!(wind.u, 0.5, 1e-9);
        assert_approx_eq!(wind.v, 1.0, 1e-9);
        assert_eq!(model.method(), "linear");
    }

    #[test]
    fn test_kernel_strategies_fit_smooth_field() {
        let u = grid(|lon, lat, _, _| lon + lat);
        let v = grid(|_, _, alt, _| alt / 100.0);
        for strategy in [
            InterpolationStrategy::RadialBasis {
                epsilon: 3.0,
                smoothing: 1e-10,
                max_samples: 1000,
            },
            InterpolationStrategy::GaussianProcess {
                length_scale: 0.3,
                signal_variance: 1.0,
                noise_variance: 1e-8,
                max_samples: 1000,
            },
        ] {
            let model = strategy.fit(&u, &v).unwrap();
            // on a training node
            let wind = model.predict([0.5, 40.5, 50.0, 0.0]).unwrap();
            assert_approx_eq!(wind.u, 41.0, 1e-3);
            assert_approx_eq!(wind.v, 0.5, 1e-3);
        }
    }

    #[test]
    fn test_empty_component_fails_fit() {
        let u = grid(|_, _, _, _| 1.0);
        let result = InterpolationStrategy::Linear.fit(&u, &[]);
        assert!(matches!(result, Err(InterpolationError::EmptyTrainingSet("v"))));
    }

    #[test]
    fn test_strategy_from_config() {
        let linear: InterpolationStrategy = serde_yaml::from_str("method: linear").unwrap();
        assert_eq!(linear, InterpolationStrategy::Linear);

        let rbf: InterpolationStrategy =
            serde_yaml::from_str("method: radial_basis\nepsilon: 2.5").unwrap();
        assert_eq!(
            rbf,
            InterpolationStrategy::RadialBasis {
                epsilon: 2.5,
                smoothing: 1e-8,
                max_samples: 2000,
            }
        );

        let gp: InterpolationStrategy = serde_yaml::from_str("method: gaussian_process").unwrap();
        assert_eq!(gp.name(), "gaussian_process");

        assert!(serde_yaml::from_str::<InterpolationStrategy>("method: cubic").is_err());
    }
}
