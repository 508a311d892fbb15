//! Unit conversions applied before values are published

use crate::constants::BYTES_PER_MB;

/// Bytes to whole megabytes, rounded to nearest
pub fn size_in_mb(bytes: u64) -> i64 {
    (bytes as f64 / BYTES_PER_MB).round() as i64
}

pub fn percent(fraction: f64) -> f64 {
    fraction * 100.0
}

/// `part / total` as a percentage, absent when there is no capacity to divide by
pub fn ratio_percent(part: u64, total: u64) -> Option<f64> {
    if total > 0 {
        Some(percent(part as f64 / total as f64))
    } else {
        None
    }
}

pub fn seconds_to_minutes(seconds: f64) -> f64 {
    seconds / 60.0
}

/// Keeps only strictly positive readings; sensors report 0 or less when they have nothing
pub fn positive(value: f64) -> Option<f64> {
    (value > 0.0).then_some(value)
}
