//! Fixed-offset wall-clock handling for weekly time rules.
//!
//! The configured timezone is a fixed UTC offset string (`+02:00`, `-05:30`);
//! no DST transitions. Rule boundaries are zero-padded `HH:MM` strings so
//! window containment reduces to lexicographic comparison.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

/// A point on the configured wall clock: day of week (0 = Sunday) plus a
/// zero-padded `HH:MM` time string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallClock {
    pub day_of_week: u8,
    pub time: String,
}

/// Parse a `±HH:MM` offset string into a chrono offset.
///
/// Returns `None` for anything that is not exactly sign, two hour digits,
/// colon, two minute digits, or for offsets outside ±23:59.
pub fn parse_utc_offset(spec: &str) -> Option<FixedOffset> {
    let spec = spec.trim();
    let bytes = spec.as_bytes();
    if bytes.len() != 6 || bytes[3] != b':' {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = spec[1..3].parse().ok()?;
    let minutes: i32 = spec[4..6].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Project a UTC instant onto the configured wall clock.
pub fn wall_clock(now_utc: DateTime<Utc>, offset: FixedOffset) -> WallClock {
    let local = now_utc.with_timezone(&offset);
    WallClock {
        day_of_week: local.weekday().num_days_from_sunday() as u8,
        time: format!("{:02}:{:02}", local.hour(), local.minute()),
    }
}

/// The day after `day` in the 0 = Sunday weekly cycle. Cross-midnight rule
/// windows spill into this day.
pub fn next_day(day: u8) -> u8 {
    (day + 1) % 7
}
