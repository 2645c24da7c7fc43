//! Metric names and label keys emitted by the operator core.
//!
//! Metrics go through the `metrics` crate facade. Nothing in the hot
//! `check` path touches a recorder directly; step timings flow through the
//! injected [`StepDurationObserver`](crate::operator::StepDurationObserver)
//! and only [`MetricsStepObserver`](crate::operator::MetricsStepObserver)
//! forwards them here.

/// Metric names as constants for consistency.
pub mod names {
    /// Histogram: time between a step's predecessor finishing and the step
    /// itself being observed finished, in seconds.
    pub const OPERATOR_STEP_DURATION_SECONDS: &str =
        "placement_operator_step_duration_seconds";
}

/// Label keys used across metrics.
pub mod labels {
    /// Step variant name (transfer_leader, add_peer, ...).
    pub const STEP: &str = "step";
    /// Terminal operator status attached to finished counters.
    pub const STATUS: &str = "status";
}
