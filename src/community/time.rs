//! Relative publish-time labels ("3 days ago") to absolute timestamps.
//!
//! The page only exposes relative labels, so every timestamp is an
//! approximation. A month counts as 30 days and a year as 365.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(second|minute|hour|day|week|month|year)s?\b").unwrap()
});

/// Convert a relative label to a timestamp, relative to the current time.
///
/// A missing or unparseable label yields the current time.
#[must_use]
pub fn normalize(label: Option<&str>) -> DateTime<Utc> {
    normalize_at(label, Utc::now())
}

/// Convert a relative label to a timestamp, relative to `now`.
#[must_use]
pub fn normalize_at(label: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    label
        .and_then(parse_offset)
        .and_then(|offset| now.checked_sub_signed(offset))
        .unwrap_or(now)
}

fn parse_offset(label: &str) -> Option<Duration> {
    let caps = RELATIVE_LABEL.captures(label)?;
    let magnitude: i64 = caps[1].parse().ok()?;

    let unit = caps[2].to_ascii_lowercase();
    let seconds_per_unit: i64 = match unit.as_str() {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 7 * 86_400,
        "month" => 30 * 86_400,
        "year" => 365 * 86_400,
        _ => return None,
    };

    Duration::try_seconds(magnitude.checked_mul(seconds_per_unit)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_units() {
        let now = now();
        assert_eq!(normalize_at(Some("30 seconds ago"), now), now - Duration::seconds(30));
        assert_eq!(normalize_at(Some("5 minutes ago"), now), now - Duration::minutes(5));
        assert_eq!(normalize_at(Some("1 hour ago"), now), now - Duration::hours(1));
        assert_eq!(normalize_at(Some("3 days ago"), now), now - Duration::days(3));
        assert_eq!(normalize_at(Some("2 weeks ago"), now), now - Duration::days(14));
        assert_eq!(normalize_at(Some("2 months ago"), now), now - Duration::days(60));
        assert_eq!(normalize_at(Some("1 year ago"), now), now - Duration::days(365));
    }

    #[test]
    fn test_ignores_case_and_suffixes() {
        let now = now();
        assert_eq!(
            normalize_at(Some("4 Days ago (edited)"), now),
            now - Duration::days(4)
        );
    }

    #[test]
    fn test_unparseable_defaults_to_now() {
        let now = now();
        assert_eq!(normalize_at(None, now), now);
        assert_eq!(normalize_at(Some(""), now), now);
        assert_eq!(normalize_at(Some("an hour ago"), now), now);
        assert_eq!(normalize_at(Some("just now"), now), now);
        assert_eq!(normalize_at(Some("99999999999999999999 days ago"), now), now);
    }

    #[test]
    fn test_normalize_uses_current_time() {
        let before = Utc::now();
        let stamp = normalize(Some("5 minutes ago"));
        let expected = before - Duration::minutes(5);
        assert!((stamp - expected).num_milliseconds().abs() < 1_000);

        let stamp = normalize(None);
        assert!((Utc::now() - stamp).num_milliseconds().abs() < 1_000);
    }
}
