//! Time handling for forecast publications and snapshot brackets.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Hours between two consecutive forecast snapshots.
pub const SNAPSHOT_STEP_HOURS: u32 = 3;

/// Hours between two consecutive publications.
pub const PUBLICATION_CYCLE_HOURS: u32 = 6;

/// Format of snapshot (parameters) directory names: `YYYYMMDDHHMM`.
pub const DIR_STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Round a time down to the nearest multiple of `hours` within its day.
pub fn floor_to_hours(time: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    let hour = time.hour() / hours * hours;
    let date = time.date_naive();
    // hour < 24, so this never fails
    Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap_or_default())
}

/// The 3-hour bracket `[before, before + 3h]` containing `time`.
pub fn bracket(time: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let before = floor_to_hours(time, SNAPSHOT_STEP_HOURS);
    (before, before + Duration::hours(SNAPSHOT_STEP_HOURS as i64))
}

/// Latest publication cycle that could exist at `now`.
pub fn latest_plausible_publication(now: DateTime<Utc>) -> DateTime<Utc> {
    floor_to_hours(now, PUBLICATION_CYCLE_HOURS)
}

/// Format a time as a `YYYYMMDDHHMM` directory stamp.
pub fn dir_stamp(time: DateTime<Utc>) -> String {
    time.format(DIR_STAMP_FORMAT).to_string()
}

/// Parse a `YYYYMMDDHHMM` directory stamp.
pub fn parse_dir_stamp(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    NaiveDateTime::parse_from_str(s, DIR_STAMP_FORMAT)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|_| TimeParseError::InvalidFormat(s.to_string()))
}

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is given.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// One forecast part of a publication: reference time plus offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForecastPart {
    /// Publication (model run) time
    pub publication: DateTime<Utc>,
    /// Forecast hour offset from the publication time
    pub offset_hours: u32,
}

impl ForecastPart {
    pub fn new(publication: DateTime<Utc>, offset_hours: u32) -> Self {
        Self {
            publication,
            offset_hours,
        }
    }

    /// The instant this part describes (publication + offset).
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.publication + Duration::hours(self.offset_hours as i64)
    }

    /// Offset from `publication` that covers `valid_time`, if it is a whole
    /// number of hours at or after the publication.
    pub fn covering(publication: DateTime<Utc>, valid_time: DateTime<Utc>) -> Option<Self> {
        let delta = valid_time - publication;
        if delta < Duration::zero() || delta.num_seconds() % 3600 != 0 {
            return None;
        }
        Some(Self::new(publication, delta.num_hours() as u32))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_floor_to_three_hours() {
        assert_eq!(floor_to_hours(utc(1, 1, 0), 3), utc(1, 0, 0));
        assert_eq!(floor_to_hours(utc(1, 3, 0), 3), utc(1, 3, 0));
        assert_eq!(floor_to_hours(utc(1, 23, 59), 3), utc(1, 21, 0));
    }

    #[test]
    fn test_bracket_crosses_midnight() {
        let (before, after) = bracket(utc(1, 22, 15));
        assert_eq!(before, utc(1, 21, 0));
        assert_eq!(after, utc(2, 0, 0));
    }

    #[test]
    fn test_latest_plausible_publication() {
        assert_eq!(latest_plausible_publication(utc(1, 17, 45)), utc(1, 12, 0));
        assert_eq!(latest_plausible_publication(utc(1, 5, 0)), utc(1, 0, 0));
    }

    #[test]
    fn test_dir_stamp_round_trip() {
        let t = utc(1, 3, 0);
        assert_eq!(dir_stamp(t), "202401010300");
        assert_eq!(parse_dir_stamp("202401010300").unwrap(), t);
        assert!(parse_dir_stamp("2024010103").is_err());
    }

    #[test]
    fn test_parse_iso8601() {
        let dt = parse_iso8601("2024-01-15T12:00:00Z").unwrap();
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 12);
        assert_eq!(parse_iso8601("2024-01-01T01:00").unwrap(), utc(1, 1, 0));
        assert!(parse_iso8601("yesterday").is_err());
    }

    #[test]
    fn test_forecast_part_valid_time() {
        let part = ForecastPart::new(utc(1, 6, 0), 27);
        assert_eq!(part.valid_time(), utc(2, 9, 0));
    }

    #[test]
    fn test_forecast_part_covering() {
        let part = ForecastPart::covering(utc(1, 6, 0), utc(1, 12, 0)).unwrap();
        assert_eq!(part.offset_hours, 6);
        assert!(ForecastPart::covering(utc(1, 6, 0), utc(1, 3, 0)).is_none());
        assert!(ForecastPart::covering(utc(1, 6, 0), utc(1, 7, 30)).is_none());
    }
}
