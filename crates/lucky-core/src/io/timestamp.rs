use chrono::{DateTime, Local, TimeZone, Utc};

use crate::consts::{FILETIME_UNIX_EPOCH_TICKS, JULIAN_DATE_UNIX_EPOCH};

/// Windows FILETIME: 100 ns ticks since 1601-01-01 UTC.
pub fn to_filetime(t: DateTime<Utc>) -> u64 {
    let ticks_since_unix = t.timestamp() as i128 * 10_000_000 + (t.timestamp_subsec_nanos() / 100) as i128;
    (FILETIME_UNIX_EPOCH_TICKS as i128 + ticks_since_unix).max(0) as u64
}

pub fn from_filetime(ticks: u64) -> Option<DateTime<Utc>> {
    let since_unix = ticks as i128 - FILETIME_UNIX_EPOCH_TICKS as i128;
    let secs = since_unix.div_euclid(10_000_000) as i64;
    let nanos = (since_unix.rem_euclid(10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// FILETIME of the same instant expressed in local wall-clock time.
pub fn local_filetime(t: DateTime<Utc>) -> u64 {
    let offset_secs = t.with_timezone(&Local).offset().local_minus_utc() as i64;
    (to_filetime(t) as i64 + offset_secs * 10_000_000).max(0) as u64
}

pub fn julian_date(t: DateTime<Utc>) -> f64 {
    let secs = t.timestamp() as f64 + t.timestamp_subsec_nanos() as f64 / 1e9;
    secs / 86_400.0 + JULIAN_DATE_UNIX_EPOCH
}

/// ISO-like timestamp with millisecond precision, as used in the frame log
/// and FITS `DATE-OBS`.
pub fn format_millis(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(to_filetime(epoch), FILETIME_UNIX_EPOCH_TICKS);
        assert_eq!(from_filetime(FILETIME_UNIX_EPOCH_TICKS), Some(epoch));
    }

    #[test]
    fn test_filetime_keeps_100ns_ticks() {
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_700).unwrap();
        assert_eq!(from_filetime(to_filetime(t)), Some(t));
    }

    #[test]
    fn test_julian_date_of_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(julian_date(epoch), JULIAN_DATE_UNIX_EPOCH);
    }

    #[test]
    fn test_format_millis() {
        let t = Utc.timestamp_opt(0, 7_000_000).unwrap();
        assert_eq!(format_millis(t), "1970-01-01T00:00:00.007");
    }
}
