use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};

pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn display_offset(hours: i32) -> anyhow::Result<FixedOffset> {
    anyhow::ensure!(
        (-23..=23).contains(&hours),
        "display UTC offset must be within -23..=23 hours (got {hours})"
    );
    FixedOffset::east_opt(hours * 3600).context("invalid display UTC offset")
}

/// `YYYY-MM-DD HH:MM:SS` in the given offset, for the dashboard's "last updated" line.
pub fn format_local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format(DISPLAY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_in_display_offset() {
        // 2026-10-16 17:30 UTC = 2026-10-17 01:30 at UTC+8
        let ts = Utc.with_ymd_and_hms(2026, 10, 16, 17, 30, 5).unwrap();
        let offset = display_offset(8).unwrap();
        assert_eq!(format_local(ts, offset), "2026-10-17 01:30:05");
    }

    #[test]
    fn negative_offsets_roll_back_the_date() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let offset = display_offset(-5).unwrap();
        assert_eq!(format_local(ts, offset), "2025-12-31 21:00:00");
    }

    #[test]
    fn rejects_out_of_range_offset() {
        assert!(display_offset(24).is_err());
    }
}
