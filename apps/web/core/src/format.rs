//! Display formatting for byte counts, timestamps, and storage usage.

use chrono::{DateTime, Utc};

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
const KB: u64 = 1024;

/// Formats a byte count in human-readable form with binary (1024) steps.
///
/// Values keep at most two decimals with trailing zeros stripped ("1.5 KB", "2 MB").
/// Anything beyond gigabytes stays in GB.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut divisor = 1u64;
    while unit < UNITS.len() - 1 && bytes >= divisor * KB {
        divisor *= KB;
        unit += 1;
    }

    let value = format!("{:.2}", bytes as f64 / divisor as f64);
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", value, UNITS[unit])
}

/// Formats a modification timestamp as a calendar date (UTC).
pub fn format_modified(modified_at: &DateTime<Utc>) -> String {
    modified_at.format("%Y-%m-%d").to_string()
}

/// Formats a usage ratio (0-100) with one decimal, like "12.5%".
pub fn format_usage_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}
