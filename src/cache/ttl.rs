//! Age-based TTL policy
//!
//! Content that has not changed for a long time is unlikely to change soon, so
//! its cache lifetime is stretched by a coefficient picked from the subject's
//! age. The result is never below [`MIN_TTL_SECS`].

use chrono::{DateTime, Duration, Utc};

/// Floor applied to every effective TTL
pub const MIN_TTL_SECS: u64 = 300;

/// (maximum age in days, coefficient), checked in order
const AGE_BUCKETS: [(i64, u64); 6] = [
    (3, 1),
    (7, 7),
    (15, 15),
    (30, 30),
    (90, 500),
    (180, 1000),
];

/// Coefficient for anything older than the last bucket
const OLDEST_COEFFICIENT: u64 = 7800;

/// Coefficient for a subject of the given age
///
/// Negative ages (timestamps in the future) get the smallest coefficient.
pub fn ttl_coefficient(age: Duration) -> u64 {
    if age <= Duration::zero() {
        return 1;
    }

    AGE_BUCKETS
        .iter()
        .find(|(max_days, _)| age <= Duration::days(*max_days))
        .map(|(_, coefficient)| *coefficient)
        .unwrap_or(OLDEST_COEFFICIENT)
}

/// Effective TTL in seconds, measured against the current time
pub fn effective_ttl(base_ttl_secs: u64, last_modified: Option<DateTime<Utc>>) -> u64 {
    effective_ttl_at(base_ttl_secs, last_modified, Utc::now())
}

/// Effective TTL in seconds, measured against `now`
pub fn effective_ttl_at(
    base_ttl_secs: u64,
    last_modified: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    let coefficient = last_modified
        .map(|modified| ttl_coefficient(now - modified))
        .unwrap_or(1);

    base_ttl_secs.saturating_mul(coefficient).max(MIN_TTL_SECS)
}

/// Convenience for callers that carry epoch milliseconds
pub fn effective_ttl_from_millis(base_ttl_secs: u64, last_modified_millis: Option<i64>) -> u64 {
    let last_modified = last_modified_millis.and_then(DateTime::<Utc>::from_timestamp_millis);
    effective_ttl(base_ttl_secs, last_modified)
}
