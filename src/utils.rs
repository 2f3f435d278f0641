//! # Utility Functions and Helper Module
//!
//! This module provides the small helpers used throughout the arrow: wall-clock
//! timestamps, identifiers, temporary directories, number formatting for the
//! console reports, and the basic statistics the monitor and the statistics
//! engine share.
//!
//! ## Key Functionality Categories
//!
//! - **Time and identity**: Epoch timestamps and short random identifiers
//! - **Formatting**: Thousands separators for human-readable console output
//! - **Statistics**: Mean and linearly interpolated percentiles
//! - **Display Helpers**: Aligned field printing for reports
//!
//! ## Usage Examples
//!
//! ```rust
//! use quiver_arrow::utils::*;
//!
//! assert_eq!(format_thousands(1234567), "1,234,567");
//! assert_eq!(format_decimal(1234.56, 1), "1,234.6");
//!
//! let p = calculate_percentiles(&[10.0, 5.0], &[50.0]);
//! assert_eq!(p, vec![(50.0, 7.5)]);
//! ```

use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a short random hexadecimal identifier
///
/// Takes the first `bytes` bytes of a UUID v4 and renders them as lowercase
/// hex, so the result is `2 * bytes` characters long. `bytes` is clamped to
/// the 1..=16 range a UUID can provide.
///
/// ## Usage
///
/// - Default arrow identities (`quiver-<id>`)
/// - Unique temporary output directory names
pub fn unique_id(bytes: usize) -> String {
    let bytes = bytes.clamp(1, 16);
    Uuid::new_v4().as_bytes()[..bytes]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Get current timestamp as fractional seconds since Unix epoch
///
/// Snapshot timestamps, run start and end times all use this clock so that
/// they can be compared directly and written to the snapshot log as-is.
///
/// ## Error Handling
///
/// If the system time is before the Unix epoch, returns 0.0 rather than
/// panicking.
pub fn current_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Create a fresh, uniquely named directory under the system temp dir
///
/// The directory is created with mode 0700 and is not removed afterwards:
/// it holds the run's output files.
///
/// ## Returns
/// - `Ok(PathBuf)`: Path of the newly created directory (e.g. `/tmp/quiver-AbC123`)
/// - `Err(io::Error)`: The directory could not be created
pub fn make_temp_dir(prefix: &str) -> io::Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
    Ok(dir.keep())
}

/// Format an integer with comma thousands separators
///
/// ## Examples
///
/// ```rust
/// # use quiver_arrow::utils::format_thousands;
/// assert_eq!(format_thousands(0), "0");
/// assert_eq!(format_thousands(1000), "1,000");
/// assert_eq!(format_thousands(-1234567), "-1,234,567");
/// ```
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if value < 0 {
        out.push('-');
    }

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}

/// Format a floating-point value with thousands separators and fixed decimals
///
/// ## Examples
///
/// ```rust
/// # use quiver_arrow::utils::format_decimal;
/// assert_eq!(format_decimal(7.5, 1), "7.5");
/// assert_eq!(format_decimal(12345.0, 0), "12,345");
/// assert_eq!(format_decimal(-0.25, 2), "-0.25");
/// ```
pub fn format_decimal(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let int_value: i64 = int_part.parse().unwrap_or(0);
    let mut out = String::new();
    if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&format_thousands(int_value));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Calculate the arithmetic mean of a slice
///
/// Returns `None` for an empty slice, since the mean of nothing is undefined
/// and must not be reported as zero.
pub fn calculate_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Calculate percentiles from a vector of values
///
/// Computes specified percentile values from a dataset using linear
/// interpolation between the closest ranks of the sorted data.
///
/// ## Algorithm Details
///
/// 1. **Sort**: Data is sorted in ascending order
/// 2. **Index Calculation**: For percentile P, index = (P/100) * (N-1)
/// 3. **Interpolation**: If index is fractional, interpolate between adjacent values
///
/// ## Empty Dataset Handling
///
/// If the input slice is empty, returns tuples with the requested percentile
/// levels paired with 0.0 values. Callers that must distinguish "no data"
/// check for emptiness first.
///
/// ## Examples
///
/// ```rust
/// # use quiver_arrow::utils::calculate_percentiles;
/// let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// let percentiles = calculate_percentiles(&values, &[50.0, 95.0]);
/// assert_eq!(percentiles[0], (50.0, 3.0));
/// assert!((percentiles[1].1 - 4.8).abs() < 1e-9);
/// ```
pub fn calculate_percentiles(values: &[f64], percentiles: &[f64]) -> Vec<(f64, f64)> {
    if values.is_empty() {
        return percentiles.iter().map(|&p| (p, 0.0)).collect();
    }

    let mut sorted_values = values.to_vec();
    sorted_values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    percentiles
        .iter()
        .map(|&p| {
            let index = (p.clamp(0.0, 100.0) / 100.0) * (sorted_values.len() - 1) as f64;
            let lower_index = index.floor() as usize;
            let upper_index = index.ceil() as usize;

            if lower_index == upper_index {
                (p, sorted_values[lower_index])
            } else {
                let lower_value = sorted_values[lower_index];
                let upper_value = sorted_values[upper_index];
                let weight = index - lower_index as f64;
                (p, lower_value + weight * (upper_value - lower_value))
            }
        })
        .collect()
}

/// Print a horizontal rule framing a report block
pub fn print_bracket() {
    println!("{}", "-".repeat(80));
}

/// Print a labelled text field
pub fn print_field(name: &str, value: &str) {
    let name = format!("{}:", name);
    println!("    {:<24} {}", name, value);
}

/// Print a labelled, right-aligned numeric field with its unit
pub fn print_numeric_field(name: &str, value: &str, unit: &str) {
    let name = format!("{}:", name);
    println!("    {:<24} {:>32} {}", name, value, unit);
}
