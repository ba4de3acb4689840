use chrono::{DateTime, TimeDelta, Utc};

/// Source of wall-clock time for every TTL and expiry decision.
///
/// The client never reads ambient time directly; tests swap in a manually
/// advanced clock.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Lossless where possible; durations too large for `TimeDelta` saturate.
pub(crate) fn delta_from_std(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Absolute expiry stamp for `ttl` from `now`, saturating at the calendar end.
pub(crate) fn expiry_from(
    now: DateTime<Utc>,
    ttl: std::time::Duration,
) -> DateTime<Utc> {
    now.checked_add_signed(delta_from_std(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
