use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use placement_model::{ResourceKind, StoreId};
use serde::{Serialize, Serializer};

use super::engine::Operator;

/// One display entry derived from an operator's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpHistory {
    pub finish_time: DateTime<Utc>,
    pub from: StoreId,
    pub to: StoreId,
    pub kind: ResourceKind,
}

/// A retired operator together with when it finished and how long it ran.
#[derive(Debug, Clone)]
pub struct OpRecord {
    operator: Arc<Operator>,
    finish_time: DateTime<Utc>,
    duration: Duration,
}

impl OpRecord {
    pub(crate) fn new(
        operator: Arc<Operator>,
        finish_time: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            operator,
            finish_time,
            duration,
        }
    }

    pub fn operator(&self) -> &Arc<Operator> {
        &self.operator
    }

    pub fn finish_time(&self) -> DateTime<Utc> {
        self.finish_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Deref for OpRecord {
    type Target = Operator;

    fn deref(&self) -> &Operator {
        &self.operator
    }
}

impl fmt::Display for OpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (finishAt:{}, duration:{})",
            self.operator,
            self.finish_time,
            humantime::format_duration(self.duration)
        )
    }
}

impl Serialize for OpRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
