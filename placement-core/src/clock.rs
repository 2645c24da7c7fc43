//! Time sources for the operator engine.
//!
//! Operators record wall-clock reach times for every status and every
//! finished step. The clock is injected so tests can move time forward
//! without sleeping.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Abstraction over wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests. Safe to share across
/// threads; `advance` is visible to every reader immediately.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Starts at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(to_unix_nanos(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(delta, Ordering::AcqRel);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.nanos.store(to_unix_nanos(at), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        from_unix_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Encodes a timestamp for storage in an atomic slot. Zero is reserved for
/// "never reached", so the epoch itself is nudged forward by a nanosecond.
pub(crate) fn to_unix_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX).max(1)
}

pub(crate) fn from_unix_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

/// Non-negative span between two instants; clock skew clamps to zero.
pub(crate) fn elapsed_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or_default()
}

/// `true` when strictly more than `window` has passed between the two times.
pub(crate) fn exceeds(from: DateTime<Utc>, to: DateTime<Utc>, window: Duration) -> bool {
    match TimeDelta::from_std(window) {
        Ok(window) => to - from > window,
        Err(_) => false,
    }
}
