use std::time::Duration;

/// Parse a duration string like "500ms", "30s", "5m", "1h" into `Duration`
///
/// A bare number is read as seconds. Supported formats:
/// - "250ms" → 250 milliseconds
/// - "30s" / "30" → 30 seconds (max 24h = 86400s)
/// - "5m" → 5 minutes (max 24h = 1440m)
/// - "2h" → 2 hours (max 1 week = 168h)
///
/// Zero is accepted here; callers decide whether it is meaningful.
///
/// # Returns
/// Some(Duration) if parse successful and within limits, None if invalid or out of range
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();

    if duration_str.is_empty() {
        return None;
    }

    if let Some(number_str) = duration_str.strip_suffix("ms") {
        let number: u64 = number_str.parse().ok()?;
        return if number <= 86_400_000 {
            Some(Duration::from_millis(number))
        } else {
            None
        };
    }

    let (number_str, unit) = match duration_str.chars().last()? {
        c if c.is_ascii_digit() => (duration_str, 's'),
        c => (&duration_str[..duration_str.len() - c.len_utf8()], c),
    };
    let number: u64 = number_str.parse().ok()?;

    match unit {
        's' if number <= 86400 => Some(Duration::from_secs(number)),
        'm' if number <= 1440 => number.checked_mul(60).map(Duration::from_secs),
        // Hours: max 1 week, catches typos like "8760h"
        'h' if number <= 168 => number.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
