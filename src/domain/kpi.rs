use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Point-in-time read of the exported KPIs.
///
/// Every field defaults to zero so an empty store still produces a complete
/// payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub boarding_hit_rate_pct: f64,
    pub eta_error_p50_s: i64,
    pub eta_error_p95_s: i64,
    pub active_clients: i64,
    pub routes_today: i64,
}

/// Nanosecond timestamp floor-aligned to a bucket width.
///
/// Emissions that land in the same bucket overwrite each other downstream
/// instead of piling up as separate points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket(i64);

impl TimeBucket {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Floor `at` to a multiple of `width` (whole seconds; sub-second widths
    /// are treated as one second).
    pub fn floor(at: DateTime<Utc>, width: Duration) -> Self {
        let width_secs = width.as_secs().max(1) as i64;
        let epoch_secs = at.timestamp().div_euclid(width_secs) * width_secs;
        Self(epoch_secs.saturating_mul(1_000_000_000))
    }

    pub fn now(width: Duration) -> Self {
        Self::floor(Utc::now(), width)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
