//! Operator lifecycle status and its lock-free tracker.
//!
//! ```text
//!            start              all steps finish
//! CREATED -----------> STARTED -----------------> SUCCESS
//!    |                    |
//!    | never started      | elapsed > timeout
//!    v                    v
//! EXPIRED              TIMEOUT
//!
//! CREATED | STARTED --cancel--> CANCELED
//! CREATED | STARTED --replace-> REPLACED
//! ```
//!
//! Every status other than CREATED and STARTED is terminal. The first
//! terminal status reached wins and the tracker accepts no further
//! transitions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{self, Clock};
use crate::error::OperatorError;

const STATUS_COUNT: usize = 7;

/// Lifecycle status of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum OpStatus {
    /// Built by a scheduler, not yet dispatched.
    Created = 0,
    /// Dispatched; steps are being driven by heartbeats.
    Started = 1,
    /// Every step observed finished.
    Success = 2,
    /// Canceled by the owner.
    Canceled = 3,
    /// Superseded by a newer operator for the same region.
    Replaced = 4,
    /// Never started within the expiry window.
    Expired = 5,
    /// Started but did not finish within its timeout.
    Timeout = 6,
}

impl OpStatus {
    pub const ALL: [OpStatus; STATUS_COUNT] = [
        OpStatus::Created,
        OpStatus::Started,
        OpStatus::Success,
        OpStatus::Canceled,
        OpStatus::Replaced,
        OpStatus::Expired,
        OpStatus::Timeout,
    ];

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OpStatus::Created,
            1 => OpStatus::Started,
            2 => OpStatus::Success,
            3 => OpStatus::Canceled,
            4 => OpStatus::Replaced,
            5 => OpStatus::Expired,
            _ => OpStatus::Timeout,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_end(self) -> bool {
        !matches!(self, OpStatus::Created | OpStatus::Started)
    }

    /// Whether the lifecycle graph has an edge from `self` to `target`.
    pub const fn can_transition_to(self, target: OpStatus) -> bool {
        match self {
            OpStatus::Created => matches!(
                target,
                OpStatus::Started | OpStatus::Expired | OpStatus::Canceled | OpStatus::Replaced
            ),
            OpStatus::Started => matches!(
                target,
                OpStatus::Success | OpStatus::Canceled | OpStatus::Replaced | OpStatus::Timeout
            ),
            OpStatus::Success
            | OpStatus::Canceled
            | OpStatus::Replaced
            | OpStatus::Expired
            | OpStatus::Timeout => false,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OpStatus::Created => "CREATED",
            OpStatus::Started => "STARTED",
            OpStatus::Success => "SUCCESS",
            OpStatus::Canceled => "CANCELED",
            OpStatus::Replaced => "REPLACED",
            OpStatus::Expired => "EXPIRED",
            OpStatus::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpStatus {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OpStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| OperatorError::UnknownStatus(s.to_string()))
    }
}

/// Records the current status and the first time each status was reached.
///
/// All mutation goes through compare-and-set on the status byte, so
/// concurrent callers racing for a transition resolve to exactly one winner.
/// Only the winner writes the reach-time slot for the new status.
pub struct OpStatusTracker {
    current: AtomicU8,
    reached: [AtomicI64; STATUS_COUNT],
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for OpStatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpStatusTracker")
            .field("current", &self.status())
            .field("created_at", &self.reach_time_of(OpStatus::Created))
            .field("started_at", &self.reach_time_of(OpStatus::Started))
            .finish()
    }
}

impl OpStatusTracker {
    /// Creates a tracker in CREATED, stamped with the clock's current time.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let tracker = Self {
            current: AtomicU8::new(OpStatus::Created as u8),
            reached: Default::default(),
            clock,
        };
        tracker.mark_reached(OpStatus::Created);
        tracker
    }

    pub fn status(&self) -> OpStatus {
        OpStatus::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Attempts to move to `target`. Returns `false` when the current status
    /// has no edge to `target` (including when it is already terminal or
    /// already equal to `target`), which also covers losing a race.
    pub fn to(&self, target: OpStatus) -> bool {
        let mut observed = self.current.load(Ordering::Acquire);
        loop {
            let from = OpStatus::from_u8(observed);
            if !from.can_transition_to(target) {
                return false;
            }
            match self.current.compare_exchange(
                observed,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.mark_reached(target);
                    tracing::trace!(from = %from, to = %target, "operator status transition");
                    return true;
                }
                Err(actual) => observed = actual,
            }
        }
    }

    /// The first time `status` was reached, or `None` if it never was.
    pub fn reach_time_of(&self, status: OpStatus) -> Option<DateTime<Utc>> {
        match self.reached[status.index()].load(Ordering::Acquire) {
            0 => None,
            nanos => Some(clock::from_unix_nanos(nanos)),
        }
    }

    pub fn is_end(&self) -> bool {
        self.status().is_end()
    }

    /// Moves a never-started operator to EXPIRED once more than
    /// `expire_after` has passed since creation. Returns `true` if the
    /// tracker is (now) EXPIRED.
    pub fn check_expired(&self, expire_after: Duration) -> bool {
        match self.status() {
            OpStatus::Created => {
                let Some(created) = self.reach_time_of(OpStatus::Created) else {
                    return false;
                };
                if !clock::exceeds(created, self.clock.now(), expire_after) {
                    return false;
                }
                self.to(OpStatus::Expired) || self.status() == OpStatus::Expired
            }
            status => status == OpStatus::Expired,
        }
    }

    /// Moves a started operator to TIMEOUT once more than `timeout` has
    /// passed since it started. Returns `true` if the tracker is (now)
    /// TIMEOUT.
    pub fn check_timeout(&self, timeout: Duration) -> bool {
        match self.status() {
            OpStatus::Started => {
                // The start slot is written right after the status CAS; a
                // reader in between simply sees "not yet timed out".
                let Some(started) = self.reach_time_of(OpStatus::Started) else {
                    return false;
                };
                if !clock::exceeds(started, self.clock.now(), timeout) {
                    return false;
                }
                self.to(OpStatus::Timeout) || self.status() == OpStatus::Timeout
            }
            status => status == OpStatus::Timeout,
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn mark_reached(&self, status: OpStatus) {
        let now = clock::to_unix_nanos(self.clock.now());
        let _ = self.reached[status.index()].compare_exchange(
            0,
            now,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
