//! Tests for utility functions

use std::time::Duration;

use chrono::{TimeZone, Utc};
use unified_scheduler::util::{age_at, now_ms, saturating_sub};

#[test]
fn test_now_ms_is_after_2020() {
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_age_at() {
    let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap();
    assert_eq!(age_at(earlier, later), Duration::from_secs(90));
    assert_eq!(age_at(later, earlier), Duration::ZERO);
}

#[test]
fn test_saturating_sub() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
    assert_eq!(
        saturating_sub(at, Duration::from_secs(10)),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(saturating_sub(at, Duration::MAX), chrono::DateTime::<Utc>::MIN_UTC);
}
