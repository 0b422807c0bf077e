//! Cache configuration.

use interpolation::InterpolationStrategy;
use serde::{Deserialize, Serialize};

fn default_margin() -> f64 {
    5.0
}

/// Settings for the local cache: training window and interpolation method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Half-width in degrees of the training window around the query longitude.
    #[serde(default = "default_margin")]
    pub lon_margin: f64,

    /// Half-height in degrees of the training window around the query latitude.
    #[serde(default = "default_margin")]
    pub lat_margin: f64,

    #[serde(default)]
    pub interpolation: InterpolationStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lon_margin: default_margin(),
            lat_margin: default_margin(),
            interpolation: InterpolationStrategy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_section() {
        let config: CacheConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.lon_margin, 5.0);
        assert_eq!(config.interpolation, InterpolationStrategy::Linear);
    }

    #[test]
    fn test_partial_override() {
        let yaml = "lat_margin: 2.5\ninterpolation:\n  method: gaussian_process\n  length_scale: 0.2\n";
        let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lon_margin, 5.0);
        assert_eq!(config.lat_margin, 2.5);
        assert_eq!(config.interpolation.name(), "gaussian_process");
    }
}
