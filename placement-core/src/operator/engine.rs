//! The operator: an ordered plan of steps driven by region heartbeats.
//!
//! Every method takes `&self`. Hot fields (status, cursor, step finish
//! times, kind, priority, timeout) are atomics; description, counters and
//! additional info sit behind `parking_lot` locks that `check` never takes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool, AtomicI64, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use placement_model::{PriorityLevel, RegionEpoch, RegionId, RegionInfo, ResourceKind, StoreId};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use super::config::OperatorConfig;
use super::influence::OpInfluence;
use super::kind::OpKind;
use super::observer::{NoopStepObserver, StepDurationObserver};
use super::record::{OpHistory, OpRecord};
use super::status::{OpStatus, OpStatusTracker};
use super::step::{ChangePeerV2Leave, OpStep, OpStepKind};
use crate::clock::{self, Clock, SystemClock};
use crate::metrics::labels;

/// Description used by operators that only leave a joint consensus state.
pub const OP_DESC_LEAVE_JOINT_STATE: &str = "leave-joint-state";

/// Additional-info key under which a cancel reason is stored.
pub const CANCEL_REASON_KEY: &str = "cancel-reason";

const TEST_REGION_SIZE_MB: u64 = 96;
const TEST_DESC: &str = "test";
const TEST_BRIEF: &str = "test";

/// Why the owner canceled an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    RegionNotFound,
    EpochNotMatch,
    Stale,
    Custom(String),
}

impl CancelReason {
    pub fn as_str(&self) -> &str {
        match self {
            CancelReason::RegionNotFound => "region not found",
            CancelReason::EpochNotMatch => "epoch not match",
            CancelReason::Stale => "stale operator",
            CancelReason::Custom(reason) => reason,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A counter the scheduler wants bumped once the operator finishes.
///
/// The final status is appended as a `status` label when the counter is
/// emitted through the `metrics` facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCounter {
    name: String,
    labels: Vec<(String, String)>,
}

impl OperatorCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    fn increment(&self, status: OpStatus) {
        let mut metric_labels: Vec<metrics::Label> = self
            .labels
            .iter()
            .map(|(key, value)| metrics::Label::new(key.clone(), value.clone()))
            .collect();
        metric_labels.push(metrics::Label::new(labels::STATUS, status.as_str()));
        metrics::counter!(self.name.clone(), metric_labels).increment(1);
    }
}

/// Injects configuration, clock and observer before building an
/// [`Operator`].
#[derive(Debug)]
pub struct OperatorBuilder {
    desc: String,
    brief: String,
    region_id: RegionId,
    epoch: RegionEpoch,
    kind: OpKind,
    approximate_size: u64,
    steps: Vec<OpStep>,
    config: OperatorConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn StepDurationObserver>,
}

impl OperatorBuilder {
    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn StepDurationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> Operator {
        let level = if self.kind.contains(OpKind::ADMIN) {
            PriorityLevel::Urgent
        } else {
            PriorityLevel::Medium
        };
        // Each step is budgeted independently; the sum is an upper bound.
        let timeout = self
            .steps
            .iter()
            .map(|step| step.timeout(&self.config.step_cost, self.approximate_size))
            .fold(Duration::ZERO, Duration::saturating_add);
        let steps_time = self.steps.iter().map(|_| AtomicI64::new(0)).collect();

        Operator {
            desc: RwLock::new(self.desc),
            brief: self.brief,
            region_id: self.region_id,
            epoch: self.epoch,
            kind: AtomicU32::new(self.kind.bits()),
            steps: self.steps,
            steps_time,
            current_step: AtomicUsize::new(0),
            status: OpStatusTracker::new(self.clock),
            level: AtomicU8::new(level.as_u8()),
            counters: RwLock::new(Vec::new()),
            additional_infos: RwLock::new(BTreeMap::new()),
            approximate_size: self.approximate_size,
            timeout_nanos: AtomicU64::new(duration_to_nanos(timeout)),
            synced: AtomicBool::new(false),
            expire_after: self.config.expire_after,
            observer: self.observer,
        }
    }
}

/// An ordered plan of steps that changes a region's replica placement or
/// leadership.
///
/// Safe to share across threads: any number of callers may run
/// [`check`](Operator::check), query status, or cancel concurrently.
pub struct Operator {
    desc: RwLock<String>,
    brief: String,
    region_id: RegionId,
    epoch: RegionEpoch,
    kind: AtomicU32,
    steps: Vec<OpStep>,
    /// Finish time of each step in Unix nanoseconds, 0 until observed.
    steps_time: Box<[AtomicI64]>,
    current_step: AtomicUsize,
    status: OpStatusTracker,
    level: AtomicU8,
    counters: RwLock<Vec<OperatorCounter>>,
    additional_infos: RwLock<BTreeMap<String, String>>,
    approximate_size: u64,
    timeout_nanos: AtomicU64,
    synced: AtomicBool,
    expire_after: Duration,
    observer: Arc<dyn StepDurationObserver>,
}

impl Operator {
    /// Builds an operator with default configuration, the system clock and
    /// no step observer.
    pub fn new(
        desc: impl Into<String>,
        brief: impl Into<String>,
        region_id: RegionId,
        epoch: RegionEpoch,
        kind: OpKind,
        approximate_size: u64,
        steps: Vec<OpStep>,
    ) -> Self {
        Self::builder(desc, brief, region_id, epoch, kind, approximate_size, steps).build()
    }

    pub fn builder(
        desc: impl Into<String>,
        brief: impl Into<String>,
        region_id: RegionId,
        epoch: RegionEpoch,
        kind: OpKind,
        approximate_size: u64,
        steps: Vec<OpStep>,
    ) -> OperatorBuilder {
        OperatorBuilder {
            desc: desc.into(),
            brief: brief.into(),
            region_id,
            epoch,
            kind,
            approximate_size,
            steps,
            config: OperatorConfig::default(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopStepObserver),
        }
    }

    /// Test helper: a 96 MB region with `"test"` descriptions. An empty step
    /// list is replaced by a single no-op leave-joint step.
    pub fn for_test(
        region_id: RegionId,
        epoch: RegionEpoch,
        kind: OpKind,
        steps: Vec<OpStep>,
    ) -> Self {
        Self::for_test_builder(region_id, epoch, kind, steps).build()
    }

    /// Like [`Operator::for_test`] but returns the builder so tests can
    /// inject a clock or observer.
    pub fn for_test_builder(
        region_id: RegionId,
        epoch: RegionEpoch,
        kind: OpKind,
        mut steps: Vec<OpStep>,
    ) -> OperatorBuilder {
        if steps.is_empty() {
            steps.push(ChangePeerV2Leave::default().into());
        }
        Self::builder(
            TEST_DESC,
            TEST_BRIEF,
            region_id,
            epoch,
            kind,
            TEST_REGION_SIZE_MB,
            steps,
        )
    }

    pub fn desc(&self) -> String {
        self.desc.read().clone()
    }

    pub fn set_desc(&self, desc: impl Into<String>) {
        *self.desc.write() = desc.into();
    }

    pub fn brief(&self) -> &str {
        &self.brief
    }

    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    pub fn region_epoch(&self) -> RegionEpoch {
        self.epoch
    }

    pub fn kind(&self) -> OpKind {
        OpKind::from_bits_truncate(self.kind.load(Ordering::Acquire))
    }

    /// ORs additional kind bits into the operator.
    pub fn attach_kind(&self, kind: OpKind) {
        self.kind.fetch_or(kind.bits(), Ordering::AcqRel);
    }

    /// The single highest-priority kind, i.e. the lowest set bit.
    pub fn scheduler_kind(&self) -> OpKind {
        self.kind().lowest_bit()
    }

    pub fn approximate_size(&self) -> u64 {
        self.approximate_size
    }

    pub fn priority_level(&self) -> PriorityLevel {
        PriorityLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn set_priority_level(&self, level: PriorityLevel) {
        self.level.store(level.as_u8(), Ordering::Release);
    }

    /// Total timeout: the sum of every step's projected duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout_nanos.load(Ordering::Acquire))
    }

    /// Copies `other`'s total timeout onto this operator. Only the first call
    /// has an effect; returns whether this one did.
    pub fn sync(&self, other: &Operator) -> bool {
        if self.synced.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.timeout_nanos
            .store(other.timeout_nanos.load(Ordering::Acquire), Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step at `index`, or `None` when out of range.
    pub fn step(&self, index: usize) -> Option<&OpStep> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[OpStep] {
        &self.steps
    }

    /// Index of the first step not yet observed finished.
    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Acquire)
    }

    /// When step `index` was first observed finished.
    pub fn step_finish_time(&self, index: usize) -> Option<DateTime<Utc>> {
        match self.steps_time.get(index)?.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(clock::from_unix_nanos(nanos)),
        }
    }

    pub fn contains_step(&self, kind: OpStepKind) -> bool {
        self.steps.iter().any(|step| step.kind() == kind)
    }

    pub fn contains_non_witness_step(&self) -> bool {
        self.contains_step(OpStepKind::BecomeNonWitness)
    }

    pub fn is_leave_joint_state_operator(&self) -> bool {
        self.desc.read().eq_ignore_ascii_case(OP_DESC_LEAVE_JOINT_STATE)
    }

    pub fn status(&self) -> OpStatus {
        self.status.status()
    }

    pub fn is_end(&self) -> bool {
        self.status.is_end()
    }

    pub fn reach_time_of(&self, status: OpStatus) -> Option<DateTime<Utc>> {
        self.status.reach_time_of(status)
    }

    pub fn create_time(&self) -> DateTime<Utc> {
        self.status
            .reach_time_of(OpStatus::Created)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.status.reach_time_of(OpStatus::Started)
    }

    pub fn has_started(&self) -> bool {
        self.start_time().is_some()
    }

    /// Time since creation.
    pub fn elapsed_time(&self) -> Duration {
        clock::elapsed_between(self.create_time(), self.now())
    }

    /// Time since start, zero if never started.
    pub fn running_time(&self) -> Duration {
        self.start_time()
            .map(|start| clock::elapsed_between(start, self.now()))
            .unwrap_or_default()
    }

    /// Moves the operator to STARTED; `false` if it already left CREATED.
    pub fn start(&self) -> bool {
        let started = self.status.to(OpStatus::Started);
        if started {
            debug!(region_id = %self.region_id, desc = %self.desc.read(), "operator started");
        }
        started
    }

    pub fn cancel(&self) -> bool {
        let canceled = self.status.to(OpStatus::Canceled);
        if canceled {
            debug!(region_id = %self.region_id, status = %OpStatus::Canceled, "operator canceled");
        }
        canceled
    }

    /// Cancels and, only if this call won the transition, stores `reason`
    /// under [`CANCEL_REASON_KEY`]. An existing reason is kept.
    pub fn cancel_with_reason(&self, reason: CancelReason) -> bool {
        if !self.cancel() {
            return false;
        }
        self.additional_infos
            .write()
            .entry(CANCEL_REASON_KEY.to_string())
            .or_insert_with(|| reason.as_str().to_string());
        true
    }

    pub fn replace(&self) -> bool {
        let replaced = self.status.to(OpStatus::Replaced);
        if replaced {
            debug!(region_id = %self.region_id, status = %OpStatus::Replaced, "operator replaced");
        }
        replaced
    }

    /// `true` once every step has been observed finished and the operator
    /// has not ended any other way. Also tries to move the status to SUCCESS;
    /// an operator that was never started stays CREATED but still reports
    /// `true`.
    pub fn check_success(&self) -> bool {
        if self.current_step() < self.steps.len() {
            return false;
        }
        if self.status.to(OpStatus::Success) {
            debug!(region_id = %self.region_id, status = %OpStatus::Success, "operator finished");
            return true;
        }
        let status = self.status();
        status == OpStatus::Success || !status.is_end()
    }

    /// Success takes priority: a finished operator never times out.
    pub fn check_timeout(&self) -> bool {
        if self.check_success() {
            return false;
        }
        let was_running = self.status() == OpStatus::Started;
        let timed_out = self.status.check_timeout(self.timeout());
        if timed_out && was_running {
            warn!(
                region_id = %self.region_id,
                timeout = %humantime::format_duration(self.timeout()),
                current_step = self.current_step(),
                "operator timed out"
            );
        }
        timed_out
    }

    pub fn check_expired(&self) -> bool {
        let was_created = self.status() == OpStatus::Created;
        let expired = self.status.check_expired(self.expire_after);
        if expired && was_created {
            warn!(region_id = %self.region_id, "operator expired before it was started");
        }
        expired
    }

    /// Status after running the expiry and timeout checks, in that order.
    pub fn check_and_get_status(&self) -> OpStatus {
        if self.check_expired() {
            OpStatus::Expired
        } else if self.check_timeout() {
            OpStatus::Timeout
        } else {
            self.status()
        }
    }

    /// Advances past every step the snapshot shows finished and returns the
    /// first one still pending, or `None` when the operator is done or has
    /// already ended.
    pub fn check(&self, region: &RegionInfo) -> Option<&OpStep> {
        if self.is_end() {
            return None;
        }
        let next = self.advance(region);
        let _ = self.check_timeout();
        next
    }

    fn advance(&self, region: &RegionInfo) -> Option<&OpStep> {
        let mut index = self.current_step();
        while let Some(step) = self.steps.get(index) {
            if !step.is_finish(region) {
                return Some(step);
            }
            self.finish_step(index, step);
            // Concurrent scans may race past each other; the cursor only grows.
            self.current_step.fetch_max(index + 1, Ordering::AcqRel);
            index += 1;
        }
        None
    }

    fn finish_step(&self, index: usize, step: &OpStep) {
        let now = self.now();
        let won = self.steps_time[index]
            .compare_exchange(0, clock::to_unix_nanos(now), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !won {
            return;
        }
        let seconds = clock::elapsed_between(self.step_start_time(index), now).as_secs_f64();
        self.observer.observe(step.name(), seconds);
        debug!(
            region_id = %self.region_id,
            step = step.name(),
            index,
            seconds,
            "operator step finished"
        );
    }

    /// A step starts when its predecessor finished; the first step starts
    /// with the operator.
    fn step_start_time(&self, index: usize) -> DateTime<Utc> {
        index
            .checked_sub(1)
            .and_then(|previous| self.step_finish_time(previous))
            .or_else(|| self.start_time())
            .unwrap_or_else(|| self.create_time())
    }

    /// Conf-version increments consumed by the steps up to and including
    /// the current one, whose effect may already be in this snapshot.
    pub fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        let Some(last) = self.steps.len().checked_sub(1) else {
            return 0;
        };
        let current = self.current_step().min(last);
        self.steps[..=current]
            .iter()
            .map(|step| step.conf_ver_changed(region))
            .sum()
    }

    /// Load the steps not yet finished per `region` still intend to apply.
    pub fn unfinished_influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        for step in self.steps.iter().skip(self.current_step()) {
            if !step.is_finish(region) {
                step.influence(influence, region);
            }
        }
    }

    /// The whole operator's eventual effect.
    pub fn total_influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        for step in &self.steps {
            step.influence(influence, region);
        }
    }

    /// Display-oriented history. Added and removed stores are paired by
    /// position, not by causal link.
    pub fn history(&self) -> Vec<OpHistory> {
        let now = self.now();
        let mut histories = Vec::new();
        let mut added: Vec<StoreId> = Vec::new();
        let mut removed: Vec<StoreId> = Vec::new();
        for step in &self.steps {
            match step {
                OpStep::TransferLeader(transfer) => histories.push(OpHistory {
                    finish_time: now,
                    from: transfer.from_store,
                    to: transfer.to_store,
                    kind: ResourceKind::Leader,
                }),
                OpStep::AddPeer(add) => added.push(add.to_store),
                OpStep::AddLearner(add) => added.push(add.to_store),
                OpStep::RemovePeer(remove) => removed.push(remove.from_store),
                OpStep::PromoteLearner(_)
                | OpStep::DemoteVoter(_)
                | OpStep::ChangePeerV2Enter(_)
                | OpStep::ChangePeerV2Leave(_)
                | OpStep::BecomeWitness(_)
                | OpStep::BecomeNonWitness(_) => {}
            }
        }
        histories.extend(added.into_iter().zip(removed).map(|(to, from)| OpHistory {
            finish_time: now,
            from,
            to,
            kind: ResourceKind::Region,
        }));
        histories
    }

    /// Freezes the operator into a record finished at `finish_time`.
    ///
    /// The duration runs from the start time, except for operators that
    /// did not succeed after finishing at least one step: those measure
    /// from the last finished step, i.e. the time spent stuck.
    pub fn record(self: &Arc<Self>, finish_time: DateTime<Utc>) -> OpRecord {
        let cursor = self.current_step();
        let stuck_since = if self.status() != OpStatus::Success && cursor > 0 {
            self.step_finish_time(cursor - 1)
        } else {
            None
        };
        let start = stuck_since
            .or_else(|| self.start_time())
            .unwrap_or_else(|| self.create_time());
        OpRecord::new(Arc::clone(self), finish_time, clock::elapsed_between(start, finish_time))
    }

    pub fn additional_info(&self, key: &str) -> Option<String> {
        self.additional_infos.read().get(key).cloned()
    }

    pub fn set_additional_info(&self, key: impl Into<String>, value: impl Into<String>) {
        self.additional_infos.write().insert(key.into(), value.into());
    }

    pub fn additional_infos(&self) -> BTreeMap<String, String> {
        self.additional_infos.read().clone()
    }

    /// The additional info as a JSON object, or an empty string when there
    /// is none.
    pub fn additional_info_json(&self) -> String {
        let infos = self.additional_infos.read();
        if infos.is_empty() {
            return String::new();
        }
        serde_json::to_string(&*infos).unwrap_or_default()
    }

    pub fn attach_counter(&self, counter: OperatorCounter) {
        self.counters.write().push(counter);
    }

    pub fn counters(&self) -> Vec<OperatorCounter> {
        self.counters.read().clone()
    }

    /// Bumps every attached counter, labelled with the current status.
    pub fn record_finished(&self) {
        let status = self.status();
        for counter in self.counters.read().iter() {
            counter.increment(status);
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.status.clock().now()
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

struct DisplayTime(Option<DateTime<Utc>>);

impl fmt::Display for DisplayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(at) => write!(f, "{at}"),
            None => f.write_str("-"),
        }
    }
}

impl fmt::Display for Operator {
    /// Note that rendering runs `check_success` and `check_timeout`, which
    /// may move the status.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{{}}} (kind:{}, region:{}{}, createAt:{}, startAt:{}, \
             currentStep:{}, size:{}, steps:[",
            self.desc.read(),
            self.brief,
            self.kind(),
            self.region_id,
            self.epoch,
            DisplayTime(Some(self.create_time())),
            DisplayTime(self.start_time()),
            self.current_step(),
            self.approximate_size,
        )?;
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}:{{{step}}}")?;
        }
        write!(f, "], timeout:[{}])", humantime::format_duration(self.timeout()))?;
        if self.check_success() {
            f.write_str(" finished")?;
        }
        if self.check_timeout() {
            f.write_str(" timeout")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("desc", &*self.desc.read())
            .field("brief", &self.brief)
            .field("region_id", &self.region_id)
            .field("epoch", &self.epoch)
            .field("kind", &self.kind())
            .field("steps", &self.steps)
            .field("current_step", &self.current_step())
            .field("status", &self.status)
            .field("priority", &self.priority_level())
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}

/// Serialized as the one-line summary wrapped in a JSON string.
impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
