//! Sinks for per-step duration observations.
//!
//! The operator never touches a metrics recorder itself. It reports each
//! finished step to an injected observer exactly once, so tests can assert
//! on observations without installing a global recorder.

use std::fmt;

use parking_lot::Mutex;

use crate::metrics::{labels, names};

/// Receives one observation per finished step.
pub trait StepDurationObserver: Send + Sync + fmt::Debug {
    /// `seconds` is the gap between this step finishing and the previous
    /// step (or the operator start, for the first step) finishing.
    fn observe(&self, step: &'static str, seconds: f64);
}

/// Discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStepObserver;

impl StepDurationObserver for NoopStepObserver {
    fn observe(&self, _step: &'static str, _seconds: f64) {}
}

/// Forwards observations to the `metrics` facade as a histogram labelled by
/// step name.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsStepObserver;

impl StepDurationObserver for MetricsStepObserver {
    fn observe(&self, step: &'static str, seconds: f64) {
        metrics::histogram!(names::OPERATOR_STEP_DURATION_SECONDS, labels::STEP => step)
            .record(seconds);
    }
}

/// Keeps every observation in memory.
#[derive(Debug, Default)]
pub struct RecordingStepObserver {
    observations: Mutex<Vec<(&'static str, f64)>>,
}

impl RecordingStepObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<(&'static str, f64)> {
        self.observations.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.observations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.lock().is_empty()
    }

    /// Number of observations recorded for `step`.
    pub fn count_of(&self, step: &str) -> usize {
        self.observations
            .lock()
            .iter()
            .filter(|(name, _)| *name == step)
            .count()
    }
}

impl StepDurationObserver for RecordingStepObserver {
    fn observe(&self, step: &'static str, seconds: f64) {
        self.observations.lock().push((step, seconds));
    }
}
