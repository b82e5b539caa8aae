//! Human-readable formatting helpers shared by the drivers, the progress
//! line and the CLI tables.

use chrono::{DateTime, Local, Utc};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count with decimal units. `force_bytes` prints the raw
/// number instead.
pub fn format_size(bytes: u64, force_bytes: bool) -> String {
    if force_bytes || bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Formats a timestamp in the local timezone.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Truncates `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate_string(s: &str, max: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max || max < 4 {
        return s.to_string();
    }
    let mut out: String = chars[..max - 3].iter().collect();
    out.push_str("...");
    out
}
