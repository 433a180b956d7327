//! Time-window utilities for chunked candle fetches and CSV timestamps.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// On-disk timestamp format used by the candle CSV files.
///
/// Naive in-file, always interpreted as UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp for CSV storage.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a CSV timestamp.
pub fn parse_timestamp(s: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
}

/// Split `[start, end)` into consecutive chunks of at most `chunk` length.
///
/// The final chunk is truncated to `end`. Returns an empty vec when the
/// range is empty or inverted.
pub fn chunk_ranges(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: Duration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut ranges = Vec::new();

    if end <= start || chunk <= Duration::zero() {
        return ranges;
    }

    let mut current = start;
    while current < end {
        let chunk_end = std::cmp::min(current + chunk, end);
        ranges.push((current, chunk_end));
        current = chunk_end;
    }

    ranges
}

/// Whole days spanned between two timestamps.
pub fn span_days(first: NaiveDateTime, last: NaiveDateTime) -> i64 {
    (last - first).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = parse_timestamp("2024-03-01 14:30:00").unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-01 14:30:00");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert!(parse_timestamp("  2024-03-01 14:30:00 ").is_ok());
        assert!(parse_timestamp("2024-03-01T14:30:00Z").is_err());
    }

    #[test]
    fn test_chunk_ranges_splits_and_truncates() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();

        let ranges = chunk_ranges(start, end, Duration::days(4));
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], (start, start + Duration::days(4)));
        assert_eq!(ranges[1].1, start + Duration::days(8));
        // Last chunk truncated to the requested end
        assert_eq!(ranges[2], (start + Duration::days(8), end));
    }

    #[test]
    fn test_chunk_ranges_single_chunk() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(2);

        let ranges = chunk_ranges(start, end, Duration::days(45));
        assert_eq!(ranges, vec![(start, end)]);
    }

    #[test]
    fn test_chunk_ranges_empty_or_inverted() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(chunk_ranges(start, start, Duration::days(1)).is_empty());
        assert!(chunk_ranges(start, start - Duration::days(1), Duration::days(1)).is_empty());
    }

    #[test]
    fn test_span_days() {
        let first = parse_timestamp("2024-01-01 00:00:00").unwrap();
        let last = parse_timestamp("2024-09-27 12:00:00").unwrap();
        assert_eq!(span_days(first, last), 270);
    }
}
