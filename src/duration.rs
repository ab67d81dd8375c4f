//! Duration parsing utilities for human-readable durations like "20s", "500ms".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like "2m", "20s", "500ms".
///
/// Supported units:
/// - `m` - minutes
/// - `s` - seconds
/// - `ms` - milliseconds
///
/// The input is case-insensitive and whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use ledgerpull::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(2 * 60));
/// assert_eq!(parse_duration("20s").unwrap(), Duration::from_secs(20));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    // "ms" must be checked before the single-letter units that it ends with.
    let (num, unit) = if s.ends_with("ms") {
        (s.trim_end_matches("ms"), "ms")
    } else if s.ends_with('m') {
        (s.trim_end_matches('m'), "m")
    } else if s.ends_with('s') {
        (s.trim_end_matches('s'), "s")
    } else {
        anyhow::bail!("Duration must end with m, s, or ms");
    };

    let num: u64 = num.parse().with_context(|| "Invalid number in duration")?;

    let duration = match unit {
        "m" => Duration::from_secs(num.checked_mul(60).context("Duration is too large")?),
        "s" => Duration::from_secs(num),
        "ms" => Duration::from_millis(num),
        _ => unreachable!(),
    };

    Ok(duration)
}

/// Format a duration to a human-readable string.
///
/// Sub-second durations format as milliseconds; otherwise the largest unit
/// that divides evenly is used.
///
/// # Examples
///
/// ```
/// use ledgerpull::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(2 * 60)), "2m");
/// assert_eq!(format_duration(Duration::from_secs(20)), "20s");
/// assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis() as u64;

    const MILLIS_PER_MINUTE: u64 = 60 * 1000;
    const MILLIS_PER_SECOND: u64 = 1000;

    if millis >= MILLIS_PER_MINUTE && millis % MILLIS_PER_MINUTE == 0 {
        format!("{}m", millis / MILLIS_PER_MINUTE)
    } else if millis >= MILLIS_PER_SECOND && millis % MILLIS_PER_SECOND == 0 {
        format!("{}s", millis / MILLIS_PER_SECOND)
    } else {
        format!("{millis}ms")
    }
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
