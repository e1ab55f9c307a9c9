//! Strictly increasing millisecond stamps.
//!
//! Producers stamp each record with [`MonotonicClock::stamp`] so records from
//! one context are totally ordered even when several land in the same
//! millisecond. The coordinator uses a second clock for server timestamps,
//! which is what the viewer's watermark compares against.
//!
//! Stamps from different processes are not synchronised; cross-context order
//! is only as good as the hosts' wall clocks.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureStamp(i64);

impl CaptureStamp {
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Converts to a UTC datetime, falling back to the epoch for
    /// out-of-range values.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or_default()
    }

    /// Whole seconds elapsed from `earlier` to `self` (never negative).
    pub fn seconds_since(&self, earlier: CaptureStamp) -> i64 {
        (self.0.saturating_sub(earlier.0)).max(0) / 1000
    }
}

impl fmt::Display for CaptureStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Clock that never returns the same or an earlier stamp twice.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `max(now, last + 1)` and remembers it.
    pub fn stamp(&self) -> CaptureStamp {
        self.stamp_at(Utc::now().timestamp_millis())
    }

    /// Same as [`stamp`](Self::stamp) with an explicit wall-clock reading.
    pub fn stamp_at(&self, now_ms: i64) -> CaptureStamp {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now_ms.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return CaptureStamp(next),
                Err(actual) => last = actual,
            }
        }
    }

    /// Moves the clock forward so the next stamp is after `seen`.
    ///
    /// Used when a restored log already contains stamps from a previous run.
    pub fn observe(&self, seen: CaptureStamp) {
        self.last.fetch_max(seen.0, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_strictly_increase_within_same_millisecond() {
        let clock = MonotonicClock::new();
        let a = clock.stamp_at(1_000);
        let b = clock.stamp_at(1_000);
        let c = clock.stamp_at(999);
        assert_eq!(a.as_millis(), 1_000);
        assert_eq!(b.as_millis(), 1_001);
        assert_eq!(c.as_millis(), 1_002);
    }

    #[test]
    fn test_stamp_follows_wall_clock_when_ahead() {
        let clock = MonotonicClock::new();
        clock.stamp_at(1_000);
        assert_eq!(clock.stamp_at(5_000).as_millis(), 5_000);
    }

    #[test]
    fn test_observe_moves_clock_forward() {
        let clock = MonotonicClock::new();
        clock.observe(CaptureStamp::from_millis(10_000));
        assert_eq!(clock.stamp_at(20).as_millis(), 10_001);
    }

    #[test]
    fn test_seconds_since() {
        let start = CaptureStamp::from_millis(1_000);
        let end = CaptureStamp::from_millis(13_999);
        assert_eq!(end.seconds_since(start), 12);
        assert_eq!(start.seconds_since(end), 0);
    }
}
