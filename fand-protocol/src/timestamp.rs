//! Timestamp conversions shared by the server and fanctl
//!
//! Timestamps always travel as RFC 3339. Naive inputs are interpreted in the
//! local time zone.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};

use fand_error::{FandError, Result};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%y %H:%M:%S",
    // C locale %c
    "%a %b %e %H:%M:%S %Y",
];

pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339()
}

/// Attach the local offset to a naive timestamp
pub fn localize(naive: NaiveDateTime) -> Result<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(DateTime::<FixedOffset>::from)
        .ok_or_else(|| FandError::invalid_value(format!("{naive} does not exist in the local time zone")))
}

pub fn parse_timestamp(input: &str) -> Result<DateTime<FixedOffset>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts);
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(input, format) {
            return Ok(ts);
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return localize(naive);
        }
    }
    Err(FandError::invalid_value(format!(
        "Could not convert {input} to a date"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_rfc3339_round_trip() {
        let ts = parse_timestamp("2031-06-01T12:30:00.250+05:30").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 5 * 3600 + 1800);
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_naive_is_local() {
        let ts = parse_timestamp("2031-06-01 12:30:00").unwrap();
        assert_eq!((ts.hour(), ts.minute()), (12, 30));
        let local = Local.from_local_datetime(&ts.naive_local()).earliest().unwrap();
        assert_eq!(ts.offset().local_minus_utc(), local.offset().local_minus_utc());
    }

    #[test]
    fn test_other_formats() {
        let ts = parse_timestamp("06/01/2031 08:00:00").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day(), ts.hour()), (2031, 6, 1, 8));

        let ts = parse_timestamp("Sun Jun  1 08:00:00 2031").unwrap();
        assert_eq!((ts.month(), ts.day()), (6, 1));

        let ts = parse_timestamp("2031-06-01T08:00:00+0100").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(parse_timestamp("tomorrow"), Err(FandError::InvalidValue(_))));
    }
}
