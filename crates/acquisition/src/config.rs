//! Configuration for the acquisition loops and the direct remote fetcher.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_base_url() -> String {
    "https://www.ncei.noaa.gov/data/global-forecast-system/access/grid-004-0.5-degree/forecast"
        .to_string()
}

fn default_file_prefix() -> String {
    "gfs_4".to_string()
}

fn default_extension() -> String {
    "grb2".to_string()
}

fn default_max_offset_hours() -> u32 {
    384
}

fn default_offset_step_hours() -> u32 {
    3
}

fn default_part_timeout_secs() -> u64 {
    3600
}

fn default_probe_timeout_secs() -> u64 {
    90
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_idle_delay_secs() -> u64 {
    600
}

fn default_unexpected_error_delay_secs() -> u64 {
    60
}

fn default_decode_idle_delay_secs() -> u64 {
    60
}

fn default_crop_margin() -> f64 {
    20.0
}

fn default_decoder_program() -> PathBuf {
    PathBuf::from("./decodeGribToCSVFiles.sh")
}

fn default_remote_probe_depth() -> u32 {
    4
}

fn default_retain_distributions() -> usize {
    2
}

fn default_enabled() -> bool {
    true
}

/// Acquisition settings, loaded from the `acquisition:` section of the
/// service config. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Run the background download and decode loops.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the distribution server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// File name prefix, e.g. `gfs_4`.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Extension of raw part files.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Last forecast-hour offset of a publication.
    #[serde(default = "default_max_offset_hours")]
    pub max_offset_hours: u32,

    /// Step between forecast-hour offsets.
    #[serde(default = "default_offset_step_hours")]
    pub offset_step_hours: u32,

    /// Hard wall-clock budget for one part download.
    #[serde(default = "default_part_timeout_secs")]
    pub part_timeout_secs: u64,

    /// Timeout for the availability probe of a publication.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Pause before retrying a failed part.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Pause between download cycles.
    #[serde(default = "default_idle_delay_secs")]
    pub idle_delay_secs: u64,

    /// Pause before re-probing after an unexpected error.
    #[serde(default = "default_unexpected_error_delay_secs")]
    pub unexpected_error_delay_secs: u64,

    /// Pause between decode cycles.
    #[serde(default = "default_decode_idle_delay_secs")]
    pub decode_idle_delay_secs: u64,

    /// Degrees around the focus point kept when decoding.
    #[serde(default = "default_crop_margin")]
    pub crop_margin: f64,

    /// External decoder: `program input output_dir lat_low lat_high lon_low lon_high`.
    #[serde(default = "default_decoder_program")]
    pub decoder_program: PathBuf,

    /// Publications the direct fetcher probes before giving up.
    #[serde(default = "default_remote_probe_depth")]
    pub remote_probe_depth: u32,

    /// Committed distributions kept under each of `gribFiles/` and
    /// `csvFiles/`; older ones are deleted after every commit. 0 keeps all.
    #[serde(default = "default_retain_distributions")]
    pub retain_distributions: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_base_url(),
            file_prefix: default_file_prefix(),
            extension: default_extension(),
            max_offset_hours: default_max_offset_hours(),
            offset_step_hours: default_offset_step_hours(),
            part_timeout_secs: default_part_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            idle_delay_secs: default_idle_delay_secs(),
            unexpected_error_delay_secs: default_unexpected_error_delay_secs(),
            decode_idle_delay_secs: default_decode_idle_delay_secs(),
            crop_margin: default_crop_margin(),
            decoder_program: default_decoder_program(),
            remote_probe_depth: default_remote_probe_depth(),
            retain_distributions: default_retain_distributions(),
        }
    }
}

impl AcquisitionConfig {
    /// Forecast-hour offsets of one publication: 0, 3, ..., 384.
    pub fn offsets(&self) -> Vec<u32> {
        (0..=self.max_offset_hours)
            .step_by(self.offset_step_hours.max(1) as usize)
            .collect()
    }

    pub fn part_timeout(&self) -> Duration {
        Duration::from_secs(self.part_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_secs(self.idle_delay_secs)
    }

    pub fn unexpected_error_delay(&self) -> Duration {
        Duration::from_secs(self.unexpected_error_delay_secs)
    }

    pub fn decode_idle_delay(&self) -> Duration {
        Duration::from_secs(self.decode_idle_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_offsets() {
        let offsets = AcquisitionConfig::default().offsets();
        assert_eq!(offsets.len(), 129);
        assert_eq!(offsets.first(), Some(&0));
        assert_eq!(offsets.last(), Some(&384));
        assert_eq!(offsets[1], 3);
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
base_url: "http://localhost:9000/gfs"
retry_delay_secs: 1
crop_margin: 10.0
"#;
        let config: AcquisitionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000/gfs");
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.crop_margin, 10.0);
        assert_eq!(config.file_prefix, "gfs_4");
        assert_eq!(config.part_timeout(), Duration::from_secs(3600));
        assert!(config.enabled);
        assert_eq!(config.retain_distributions, 2);
    }
}
