use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use super::error::{Result, SyncError};

/// Wire format for every timestamp exchanged between nodes. Second
/// resolution, no timezone: both ends read it as UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| SyncError::InvalidTimestamp(raw.to_string()))
}

/// Short form used in log lines.
pub fn clock_face(time: &DateTime<Utc>) -> String {
    time.format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use proptest::prelude::*;

    #[test]
    fn test_parse_known_timestamp() {
        let parsed = parse_timestamp("2006-01-02 15:04:05").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn test_parse_trims_line_ending() {
        let parsed = parse_timestamp("2024-02-29 23:59:59\n").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-02-29 23:59:59");
    }

    #[test]
    fn test_format_drops_subseconds() {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(format_timestamp(&time), "2025-06-01 08:30:00");
        assert_eq!(clock_face(&time), "08:30:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "not a date", "2024-13-01 00:00:00", "2024-01-01T00:00:00", "2024-01-01"] {
            assert!(
                matches!(parse_timestamp(raw), Err(SyncError::InvalidTimestamp(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity_at_second_resolution(secs in 0i64..253_402_300_799i64, nanos in 0u32..1_000_000_000u32) {
            let time = Utc.timestamp_opt(secs, nanos).unwrap();
            let parsed = parse_timestamp(&format_timestamp(&time)).unwrap();
            prop_assert_eq!(parsed, time.with_nanosecond(0).unwrap());
        }
    }
}
