//! Utility functions and helpers

use chrono::{DateTime, Local, TimeZone, Utc};

/// Round to a fixed number of fractional digits
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

/// Prices are stored with 2 fractional digits
pub fn round_price(value: f64) -> f64 {
    round_to(value, 2)
}

/// Percent-change figures are stored with 4 fractional digits
pub fn round_change(value: f64) -> f64 {
    round_to(value, 4)
}

/// Truncate a unix timestamp (seconds) to its whole minute
pub fn minute_bucket(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(60)
}

/// Calculate percentage change
pub fn calculate_percentage_change(old_value: f64, new_value: f64) -> Option<f64> {
    if old_value != 0.0 {
        Some(((new_value - old_value) / old_value) * 100.0)
    } else {
        None
    }
}

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Render a stored UTC timestamp in the operator's local time
pub fn format_local(timestamp: i64, fmt: &str) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => DateTime::<Local>::from(dt).format(fmt).to_string(),
        None => timestamp.to_string(),
    }
}
