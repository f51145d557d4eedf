//! Wall-clock helpers shared by the resilience layer and the scheduler.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Elapsed time between `earlier` and `now`, clamped to zero when the clock
/// went backwards.
pub fn age_at(earlier: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Subtract a std duration from a timestamp, saturating at the minimum
/// representable instant.
pub fn saturating_sub(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
