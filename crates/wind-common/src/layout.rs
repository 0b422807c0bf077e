//! On-disk layout of raw and decoded forecast distributions.
//!
//! ```text
//! {root}/gribFiles/{YYYYMMDDHH}00_distributed/{YYYYMMDDHH}00.{ext}
//! {root}/csvFiles/{YYYYMMDDHH}00_distributed/{YYYYMMDDHHMM}/{level}_{component}Wind.csv
//! ```
//!
//! Work in progress is written to `{YYYYMMDDHH}00_staging` siblings and
//! renamed into place once complete, so only finished distributions carry the
//! `_distributed` suffix.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{WindError, WindResult};
use crate::time::{self, SNAPSHOT_STEP_HOURS};

const RAW_DIR: &str = "gribFiles";
const DECODED_DIR: &str = "csvFiles";
const DISTRIBUTED_SUFFIX: &str = "_distributed";
const STAGING_SUFFIX: &str = "_staging";

/// Paths of the storage tree rooted at one base directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding raw downloaded distributions.
    pub fn raw_root(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    /// Directory holding decoded distributions.
    pub fn decoded_root(&self) -> PathBuf {
        self.root.join(DECODED_DIR)
    }

    /// Directory name of a committed distribution, e.g. `202401010000_distributed`.
    pub fn distribution_dir_name(publication: DateTime<Utc>) -> String {
        format!("{}00{}", publication.format("%Y%m%d%H"), DISTRIBUTED_SUFFIX)
    }

    /// Directory name of a distribution still being written.
    pub fn staging_dir_name(publication: DateTime<Utc>) -> String {
        format!("{}00{}", publication.format("%Y%m%d%H"), STAGING_SUFFIX)
    }

    /// Raw file name of a forecast part, stamped with its valid time.
    pub fn part_file_name(valid_time: DateTime<Utc>, extension: &str) -> String {
        format!("{}00.{}", valid_time.format("%Y%m%d%H"), extension)
    }

    pub fn raw_distribution_dir(&self, publication: DateTime<Utc>) -> PathBuf {
        self.raw_root().join(Self::distribution_dir_name(publication))
    }

    pub fn raw_staging_dir(&self, publication: DateTime<Utc>) -> PathBuf {
        self.raw_root().join(Self::staging_dir_name(publication))
    }

    pub fn decoded_distribution_dir(&self, publication: DateTime<Utc>) -> PathBuf {
        self.decoded_root().join(Self::distribution_dir_name(publication))
    }

    pub fn decoded_staging_dir(&self, publication: DateTime<Utc>) -> PathBuf {
        self.decoded_root().join(Self::staging_dir_name(publication))
    }

    /// Check that the base directories exist.
    pub fn ensure_exists(&self) -> WindResult<()> {
        for dir in [self.raw_root(), self.decoded_root()] {
            if !dir.is_dir() {
                return Err(WindError::Configuration(format!(
                    "storage directory missing: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Create the base directories if they are missing.
    pub fn create_dirs(&self) -> WindResult<()> {
        std::fs::create_dir_all(self.raw_root())?;
        std::fs::create_dir_all(self.decoded_root())?;
        Ok(())
    }

    /// Newest committed raw distribution.
    pub fn newest_raw(&self) -> WindResult<Option<DateTime<Utc>>> {
        Ok(list_distributions(&self.raw_root())?.into_iter().next())
    }

    /// Newest committed decoded distribution.
    pub fn newest_decoded(&self) -> WindResult<Option<DateTime<Utc>>> {
        Ok(list_distributions(&self.decoded_root())?.into_iter().next())
    }

    /// Find the decoded parameters directory for the 3-hour mark at or before `time`.
    ///
    /// Distributions are searched newest first; the first one holding the
    /// requested snapshot wins.
    pub fn find_parameters_dir(&self, time: DateTime<Utc>) -> WindResult<PathBuf> {
        let instant = time::floor_to_hours(time, SNAPSHOT_STEP_HOURS);
        let stamp = time::dir_stamp(instant);
        let decoded = self.decoded_root();

        for publication in list_distributions(&decoded)? {
            let candidate = decoded
                .join(Self::distribution_dir_name(publication))
                .join(&stamp);
            if candidate.is_dir() {
                debug!(
                    instant = %instant,
                    publication = %publication,
                    "Resolved snapshot directory"
                );
                return Ok(candidate);
            }
        }

        Err(WindError::DataUnavailable(format!(
            "no decoded distribution covers {}",
            instant
        )))
    }
}

/// Delete committed distributions in `dir` beyond the newest `keep`.
///
/// `keep == 0` keeps everything. Staging directories are left alone.
/// Returns the publications removed, newest first.
pub fn prune_distributions(dir: &Path, keep: usize) -> WindResult<Vec<DateTime<Utc>>> {
    if keep == 0 {
        return Ok(Vec::new());
    }

    let stale: Vec<_> = list_distributions(dir)?.into_iter().skip(keep).collect();
    for publication in &stale {
        let path = dir.join(StorageLayout::distribution_dir_name(*publication));
        std::fs::remove_dir_all(&path)?;
        debug!(path = %path.display(), "Pruned distribution");
    }
    Ok(stale)
}

/// List committed distributions in `dir`, newest first.
///
/// Entries that do not follow the `{YYYYMMDDHH}00_distributed` convention
/// are ignored. A missing directory is a configuration error.
pub fn list_distributions(dir: &Path) -> WindResult<Vec<DateTime<Utc>>> {
    if !dir.is_dir() {
        return Err(WindError::Configuration(format!(
            "storage directory missing: {}",
            dir.display()
        )));
    }

    let mut publications = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(stamp) = name.to_str().and_then(|n| n.strip_suffix(DISTRIBUTED_SUFFIX)) else {
            continue;
        };
        if let Ok(publication) = time::parse_dir_stamp(stamp) {
            publications.push(publication);
        }
    }

    publications.sort_unstable_by(|a, b| b.cmp(a));
    Ok(publications)
}
