//! Decoded forecast snapshot: the wind tables of one instant.

use std::path::Path;

use chrono::{DateTime, Utc};
use interpolation::TrainingSample;
use tracing::{debug, instrument, warn};
use wind_common::{
    time::{floor_to_hours, SNAPSHOT_STEP_HOURS},
    wind::{ALTITUDE_HIGH, ALTITUDE_LOW},
    AltitudeLevel, Boundary, Spot, StorageLayout, WindComponent, WindError, WindResult,
    ALTITUDE_LEVELS,
};

/// Tolerance when comparing the extents of u and v tables of one level.
pub const GEO_COORDINATE_EPSILON: f64 = 1e-6;

/// One row of a decoded table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableRow {
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

#[derive(Debug, Clone)]
struct LevelTables {
    level: AltitudeLevel,
    u: Vec<TableRow>,
    v: Vec<TableRow>,
}

impl LevelTables {
    fn rows(&self, component: WindComponent) -> &[TableRow] {
        match component {
            WindComponent::U => &self.u,
            WindComponent::V => &self.v,
        }
    }
}

/// Wind tables for every altitude level at one instant, plus the spatial
/// bounds on which u and v agree.
///
/// Snapshots are immutable once loaded.
#[derive(Debug, Clone)]
pub struct Snapshot {
    date: DateTime<Utc>,
    bounds: Boundary,
    levels: Vec<LevelTables>,
}

impl Snapshot {
    /// Load the snapshot for the 3-hour mark at or before `time` from the
    /// newest decoded distribution that contains it.
    #[instrument(skip(layout), fields(time = %time))]
    pub fn load_for_instant(layout: &StorageLayout, time: DateTime<Utc>) -> WindResult<Self> {
        let dir = layout.find_parameters_dir(time)?;
        Self::load_from_dir(&dir, floor_to_hours(time, SNAPSHOT_STEP_HOURS))
    }

    /// Load the tables of an explicit parameters directory.
    pub fn load_from_dir(dir: &Path, date: DateTime<Utc>) -> WindResult<Self> {
        let mut levels = Vec::with_capacity(ALTITUDE_LEVELS.len());
        for level in ALTITUDE_LEVELS {
            levels.push(LevelTables {
                level,
                u: read_table(&dir.join(level.table_file_name(WindComponent::U)))?,
                v: read_table(&dir.join(level.table_file_name(WindComponent::V)))?,
            });
        }
        Ok(Self::from_tables(date, levels))
    }

    fn from_tables(date: DateTime<Utc>, levels: Vec<LevelTables>) -> Self {
        let mut bounds = Boundary {
            lon_low: f64::INFINITY,
            lon_high: f64::NEG_INFINITY,
            lat_low: f64::INFINITY,
            lat_high: f64::NEG_INFINITY,
            alt_low: ALTITUDE_LOW,
            alt_high: ALTITUDE_HIGH,
        };

        for tables in &levels {
            let u = Extent::of(&tables.u);
            let v = Extent::of(&tables.v);
            let level = tables.level.name();
            merge_bound(&mut bounds.lon_low, u.lon_low, v.lon_low, f64::min, "longitude lower", &level);
            merge_bound(&mut bounds.lon_high, u.lon_high, v.lon_high, f64::max, "longitude upper", &level);
            merge_bound(&mut bounds.lat_low, u.lat_low, v.lat_low, f64::min, "latitude lower", &level);
            merge_bound(&mut bounds.lat_high, u.lat_high, v.lat_high, f64::max, "latitude upper", &level);
        }

        debug!(
            date = %date,
            lon_low = bounds.lon_low,
            lon_high = bounds.lon_high,
            lat_low = bounds.lat_low,
            lat_high = bounds.lat_high,
            "Loaded snapshot"
        );

        Self {
            date,
            bounds,
            levels,
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn bounds(&self) -> &Boundary {
        &self.bounds
    }

    /// Rows of one level and component, in file order.
    pub fn rows(&self, level: AltitudeLevel, component: WindComponent) -> &[TableRow] {
        self.levels
            .iter()
            .find(|t| t.level == level)
            .map(|t| t.rows(component))
            .unwrap_or(&[])
    }

    /// Training samples for one component inside `window` (inclusive on
    /// every side), across all levels, tagged with `time_offset` seconds.
    pub fn training_samples(
        &self,
        time_offset: f64,
        component: WindComponent,
        window: &Boundary,
    ) -> Vec<TrainingSample> {
        self.levels
            .iter()
            .flat_map(|tables| {
                let altitude = tables.level.meters();
                tables
                    .rows(component)
                    .iter()
                    .filter(|row| window.contains_position(row.longitude, row.latitude))
                    .map(move |row| {
                        TrainingSample::new(row.longitude, row.latitude, altitude, time_offset, row.value)
                    })
            })
            .collect()
    }

    /// The 8 corners of this snapshot's box, all at its own date.
    pub fn eight_corners(&self) -> [Spot; 8] {
        let b = &self.bounds;
        let mut corners = [Spot::new(self.date, 0.0, 0.0, 0.0); 8];
        let mut i = 0;
        for lon in [b.lon_low, b.lon_high] {
            for lat in [b.lat_low, b.lat_high] {
                for alt in [b.alt_low, b.alt_high] {
                    corners[i] = Spot::new(self.date, lon, lat, alt);
                    i += 1;
                }
            }
        }
        corners
    }
}

struct Extent {
    lon_low: f64,
    lon_high: f64,
    lat_low: f64,
    lat_high: f64,
}

impl Extent {
    fn of(rows: &[TableRow]) -> Self {
        rows.iter().fold(
            Extent {
                lon_low: f64::INFINITY,
                lon_high: f64::NEG_INFINITY,
                lat_low: f64::INFINITY,
                lat_high: f64::NEG_INFINITY,
            },
            |e, r| Extent {
                lon_low: e.lon_low.min(r.longitude),
                lon_high: e.lon_high.max(r.longitude),
                lat_low: e.lat_low.min(r.latitude),
                lat_high: e.lat_high.max(r.latitude),
            },
        )
    }
}

fn merge_bound(
    aggregate: &mut f64,
    u: f64,
    v: f64,
    pick: fn(f64, f64) -> f64,
    which: &str,
    level: &str,
) {
    if (u - v).abs() > GEO_COORDINATE_EPSILON {
        warn!(
            level = level,
            u_bound = u,
            v_bound = v,
            "u and v {} bounds disagree, excluding from snapshot bounds",
            which
        );
        return;
    }
    *aggregate = pick(*aggregate, u);
}

fn read_table(path: &Path) -> WindResult<Vec<TableRow>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        WindError::DataUnavailable(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_table(&text).map_err(|line| {
        WindError::InvalidData(format!("{}: malformed row {}", path.display(), line))
    })
}

/// Parse `latitude,longitude,value` rows; on failure returns the 1-based line number.
fn parse_table(text: &str) -> Result<Vec<TableRow>, usize> {
    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(|f| f.trim().parse::<f64>());
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(Ok(latitude)), Some(Ok(longitude)), Some(Ok(value)), None) => rows.push(TableRow {
                latitude,
                longitude,
                value,
            }),
            _ => return Err(index + 1),
        }
    }
    Ok(rows)
}
