//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Offset of Korea Standard Time, used by VLIVE timestamps
const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Parse a `#rrggbb` (or `rrggbb`) colour into its integer value
pub fn parse_hex_color(raw: &str) -> Option<u32> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp expressed in KST
pub fn parse_kst_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS)?;
    kst.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a unix timestamp in seconds to a UTC instant
pub fn from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#e64c5b"), Some(0xe64c5b));
        assert_eq!(parse_hex_color("FFFFFF"), Some(0xffffff));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#zzzzzz"), None);
    }

    #[test]
    fn test_parse_kst_datetime() {
        let parsed = parse_kst_datetime("2020-03-01 21:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2020-03-01T12:00:00+00:00");
        assert!(parse_kst_datetime("yesterday").is_none());
    }

    #[test]
    fn test_from_unix_secs() {
        let dt = from_unix_secs(1_600_000_000).unwrap();
        assert_eq!(dt.timestamp(), 1_600_000_000);
    }
}
