//! Windows FILETIME conversion.

use chrono::{DateTime, TimeZone, Utc};

/// 100-nanosecond intervals between 1601-01-01 and the Unix epoch.
const EPOCH_DIFF: u64 = 116_444_736_000_000_000;

/// Converts a Windows FILETIME (100ns ticks since 1601) to a UTC datetime.
///
/// Values before the Unix epoch and values chrono cannot represent collapse
/// to the epoch, which keeps CSV output well-formed on garbage timestamps.
pub fn filetime_to_datetime(filetime: u64) -> DateTime<Utc> {
    let ticks = filetime.saturating_sub(EPOCH_DIFF);
    let secs = (ticks / 10_000_000) as i64;
    let nanos = ((ticks % 10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap())
}

/// Renders a FILETIME as ISO-8601 UTC with second precision.
pub fn filetime_to_iso8601(filetime: u64) -> String {
    filetime_to_datetime(filetime)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_maps_to_1970() {
        assert_eq!(filetime_to_iso8601(EPOCH_DIFF), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_known_timestamp() {
        // 2017-01-01 00:00:00 UTC
        let filetime = EPOCH_DIFF + 1_483_228_800 * 10_000_000;
        assert_eq!(filetime_to_iso8601(filetime), "2017-01-01T00:00:00Z");
    }

    #[test]
    fn test_pre_epoch_clamps() {
        assert_eq!(filetime_to_iso8601(0), "1970-01-01T00:00:00Z");
    }
}
