//! On-disk fixtures: temporary storage trees holding raw and decoded
//! distributions laid out the way the acquisition loops write them.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use wind_common::{
    time::dir_stamp, AltitudeLevel, StorageLayout, WindComponent, ALTITUDE_LEVELS,
};

use crate::generators::{axis_values, WindField};

/// Common regions for testing.
pub mod region {
    use super::Region;

    /// Small square around (10, 20), large enough for a ±5° cache window.
    pub const ORIGIN_TEST: Region = Region {
        lon_low: 4.0,
        lon_high: 16.0,
        lat_low: 14.0,
        lat_high: 26.0,
        step: 1.0,
    };
}

/// A rectangular lon/lat region sampled on a regular grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub lon_low: f64,
    pub lon_high: f64,
    pub lat_low: f64,
    pub lat_high: f64,
    pub step: f64,
}

impl Region {
    /// Square region centred on a point.
    pub fn around(longitude: f64, latitude: f64, half_width: f64, step: f64) -> Self {
        Self {
            lon_low: longitude - half_width,
            lon_high: longitude + half_width,
            lat_low: latitude - half_width,
            lat_high: latitude + half_width,
            step,
        }
    }

    pub fn longitudes(&self) -> Vec<f64> {
        axis_values(self.lon_low, self.lon_high, self.step)
    }

    pub fn latitudes(&self) -> Vec<f64> {
        axis_values(self.lat_low, self.lat_high, self.step)
    }
}

/// Write one decoded table: rows `latitude,longitude,value`, no header.
pub fn write_table(path: &Path, rows: &[(f64, f64, f64)]) {
    let mut text = String::new();
    for (lat, lon, value) in rows {
        writeln!(text, "{lat},{lon},{value}").unwrap();
    }
    std::fs::write(path, text).unwrap();
}

/// Write the 14 tables (7 levels × u/v) of one snapshot into `dir`.
pub fn write_snapshot_dir(dir: &Path, region: &Region, field: &impl WindField) {
    std::fs::create_dir_all(dir).unwrap();
    for level in ALTITUDE_LEVELS {
        write_level(dir, level, region, field);
    }
}

fn write_level(dir: &Path, level: AltitudeLevel, region: &Region, field: &impl WindField) {
    let mut u_rows = Vec::new();
    let mut v_rows = Vec::new();
    for lat in region.latitudes() {
        for lon in region.longitudes() {
            let (u, v) = field(lon, lat, level.meters());
            u_rows.push((lat, lon, u));
            v_rows.push((lat, lon, v));
        }
    }
    write_table(&dir.join(level.table_file_name(WindComponent::U)), &u_rows);
    write_table(&dir.join(level.table_file_name(WindComponent::V)), &v_rows);
}

/// Temporary storage root with `gribFiles/` and `csvFiles/` created.
///
/// The directory is removed when the value is dropped.
pub struct TestStorage {
    dir: TempDir,
    layout: StorageLayout,
}

impl TestStorage {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.create_dirs().unwrap();
        Self { dir, layout }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Write a decoded snapshot for `instant` inside the committed distribution
    /// of `publication`, returning the parameters directory.
    pub fn write_snapshot(
        &self,
        publication: DateTime<Utc>,
        instant: DateTime<Utc>,
        region: &Region,
        field: &impl WindField,
    ) -> PathBuf {
        let dir = self
            .layout
            .decoded_distribution_dir(publication)
            .join(dir_stamp(instant));
        write_snapshot_dir(&dir, region, field);
        dir
    }

    /// Write a committed raw distribution containing placeholder part files
    /// for the given forecast offsets.
    pub fn write_raw_distribution(
        &self,
        publication: DateTime<Utc>,
        offsets: impl IntoIterator<Item = u32>,
        extension: &str,
    ) -> PathBuf {
        let dir = self.layout.raw_distribution_dir(publication);
        std::fs::create_dir_all(&dir).unwrap();
        for offset in offsets {
            let valid = publication + Duration::hours(i64::from(offset));
            let name = StorageLayout::part_file_name(valid, extension);
            std::fs::write(dir.join(name), format!("part {offset:03}")).unwrap();
        }
        dir
    }
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}
