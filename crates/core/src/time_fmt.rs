// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp formatting helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a wall-clock time as an ISO-8601 UTC string (`2026-03-01T12:00:00Z`).
///
/// This is the format used in every persisted entity.
pub fn iso_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a wall-clock time as a filename-safe stamp (`20260301_120000`).
///
/// Used for append-only snapshot files, where lexical order is time order.
pub fn compact_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:34:56Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn iso_ts_ends_with_z() {
        assert_eq!(iso_ts(sample()), "2026-03-01T12:34:56Z");
    }

    #[test]
    fn compact_ts_is_filename_safe() {
        let stamp = compact_ts(sample());
        assert_eq!(stamp, "20260301_123456");
        assert!(!stamp.contains(':'));
    }
}
