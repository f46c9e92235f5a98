use std::time::Duration;

/// Shortest interval a job may be scheduled at.
pub const MIN_INTERVAL_MINUTES: u64 = 1;

/// Longest interval a job may be scheduled at (one year). Keeps the first
/// deadline representable as a timer instant.
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Where a resolved interval came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSource {
    Configured,
    Clamped,
    Default,
}

/// Resolves a job interval from its raw configured value.
///
/// Missing, blank or non-integer values fall back to `default_minutes`.
/// Fractional minutes such as `"2.5"` count as non-integer. Integers outside
/// `MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES` are clamped into that range.
pub fn resolve_interval_minutes(raw: Option<&str>, default_minutes: u64) -> (u64, IntervalSource) {
    let parsed = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<i128>().ok());

    match parsed {
        Some(minutes) if minutes < i128::from(MIN_INTERVAL_MINUTES) => {
            (MIN_INTERVAL_MINUTES, IntervalSource::Clamped)
        }
        Some(minutes) if minutes > i128::from(MAX_INTERVAL_MINUTES) => {
            (MAX_INTERVAL_MINUTES, IntervalSource::Clamped)
        }
        Some(minutes) => (minutes as u64, IntervalSource::Configured),
        None => (
            default_minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES),
            IntervalSource::Default,
        ),
    }
}

pub fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_value() {
        assert_eq!(resolve_interval_minutes(Some("5"), 60), (5, IntervalSource::Configured));
        assert_eq!(resolve_interval_minutes(Some(" 30 "), 60), (30, IntervalSource::Configured));
    }

    #[test]
    fn test_zero_and_negative_clamped() {
        assert_eq!(resolve_interval_minutes(Some("0"), 60), (1, IntervalSource::Clamped));
        assert_eq!(resolve_interval_minutes(Some("-15"), 60), (1, IntervalSource::Clamped));
    }

    #[test]
    fn test_huge_values_clamped_to_maximum() {
        assert_eq!(
            resolve_interval_minutes(Some("9223372036854775807"), 60),
            (MAX_INTERVAL_MINUTES, IntervalSource::Clamped)
        );
        assert_eq!(
            resolve_interval_minutes(Some("99999999999999999999999"), 60),
            (MAX_INTERVAL_MINUTES, IntervalSource::Clamped)
        );
        assert_eq!(
            resolve_interval_minutes(Some("525600"), 60),
            (MAX_INTERVAL_MINUTES, IntervalSource::Configured)
        );
        assert_eq!(resolve_interval_minutes(None, u64::MAX), (MAX_INTERVAL_MINUTES, IntervalSource::Default));
    }

    #[test]
    fn test_non_numeric_falls_back_to_default() {
        assert_eq!(resolve_interval_minutes(Some("often"), 60), (60, IntervalSource::Default));
        assert_eq!(resolve_interval_minutes(Some("2.5"), 15), (15, IntervalSource::Default));
        assert_eq!(resolve_interval_minutes(Some(""), 15), (15, IntervalSource::Default));
    }

    #[test]
    fn test_missing_falls_back_to_default() {
        assert_eq!(resolve_interval_minutes(None, 15), (15, IntervalSource::Default));
    }

    #[test]
    fn test_zero_default_still_clamped() {
        assert_eq!(resolve_interval_minutes(None, 0), (1, IntervalSource::Default));
    }

    #[test]
    fn test_minutes_to_duration() {
        assert_eq!(minutes_to_duration(2), Duration::from_secs(120));
    }
}
