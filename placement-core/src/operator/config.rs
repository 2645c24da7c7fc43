use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, Result};

/// Operators that are never dispatched are abandoned after this window.
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(3);
/// Upper bound accepted for `fast_step_wait` and `slow_step_wait`.
pub const MAX_STEP_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Global knobs that tune operator lifecycle accounting.
///
/// All fields carry defaults so deployments can override a single value
/// without supplying a full configuration payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// How long a created operator may wait for `start` before it expires.
    pub expire_after: Duration,
    /// Per-step timeout model used to derive an operator's total timeout.
    pub step_cost: StepCostModel,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            expire_after: DEFAULT_EXPIRE_AFTER,
            step_cost: StepCostModel::default(),
        }
    }
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.expire_after.is_zero() {
            return Err(OperatorError::InvalidConfig(
                "expire_after must be greater than zero".to_string(),
            ));
        }
        self.step_cost.validate()
    }
}

/// Projected worst-case durations for the two classes of step.
///
/// Metadata-only steps (leadership transfer, role changes, peer removal)
/// take a constant `fast_step_wait`. Data-copy steps (adding a replica,
/// rebuilding a witness into a full replica) scale with region size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepCostModel {
    /// Constant timeout for metadata-only steps.
    pub fast_step_wait: Duration,
    /// Base timeout for data-copy steps.
    pub slow_step_wait: Duration,
    /// Seconds of copy time budgeted per MB of region data.
    pub slow_executor_secs_per_mb: f64,
}

impl Default for StepCostModel {
    fn default() -> Self {
        Self {
            fast_step_wait: Duration::from_secs(60),
            slow_step_wait: Duration::from_secs(10 * 60),
            slow_executor_secs_per_mb: 6.0,
        }
    }
}

impl StepCostModel {
    pub fn fast_step_duration(&self) -> Duration {
        self.fast_step_wait
    }

    /// `rate * size`; when that estimate is shorter than `slow_step_wait`
    /// the base wait is added on top so small regions still get headroom for
    /// snapshot generation and transfer setup.
    pub fn slow_step_duration(&self, region_size_mb: u64) -> Duration {
        let seconds = self.slow_executor_secs_per_mb * region_size_mb as f64;
        let estimate = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        if estimate < self.slow_step_wait {
            estimate.saturating_add(self.slow_step_wait)
        } else {
            estimate
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, wait) in [
            ("fast_step_wait", self.fast_step_wait),
            ("slow_step_wait", self.slow_step_wait),
        ] {
            if wait > MAX_STEP_WAIT {
                return Err(OperatorError::InvalidConfig(format!(
                    "{name} must be at most {}, got {}",
                    humantime::format_duration(MAX_STEP_WAIT),
                    humantime::format_duration(wait)
                )));
            }
        }
        if !self.slow_executor_secs_per_mb.is_finite() || self.slow_executor_secs_per_mb < 0.0 {
            return Err(OperatorError::InvalidConfig(format!(
                "slow_executor_secs_per_mb must be a non-negative number, got {}",
                self.slow_executor_secs_per_mb
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_steps_scale_with_region_size() {
        let model = StepCostModel::default();
        // 6s/MB * 96MB = 576s, below the 600s base, so the base is added.
        assert_eq!(model.slow_step_duration(96), Duration::from_secs(576 + 600));
        // 6s/MB * 200MB = 1200s, above the base, used as-is.
        assert_eq!(model.slow_step_duration(200), Duration::from_secs(1200));
        assert_eq!(model.slow_step_duration(0), Duration::from_secs(600));
    }

    #[test]
    fn fast_steps_ignore_region_size() {
        let model = StepCostModel::default();
        assert_eq!(model.fast_step_duration(), Duration::from_secs(60));
    }

    #[test]
    fn validate_rejects_nonsense_values() {
        let mut config = OperatorConfig::default();
        assert!(config.validate().is_ok());

        config.step_cost.slow_executor_secs_per_mb = f64::NAN;
        assert!(matches!(config.validate(), Err(OperatorError::InvalidConfig(_))));

        let config = OperatorConfig {
            expire_after: Duration::ZERO,
            ..OperatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_slow_wait_saturates_instead_of_overflowing() {
        let model = StepCostModel {
            slow_step_wait: Duration::MAX,
            ..StepCostModel::default()
        };
        assert_eq!(model.slow_step_duration(96), Duration::MAX);
        assert_eq!(model.slow_step_duration(0), Duration::MAX);
    }

    #[test]
    fn validate_caps_step_waits() {
        let mut config = OperatorConfig::default();
        config.step_cost.slow_step_wait = MAX_STEP_WAIT;
        assert!(config.validate().is_ok());

        config.step_cost.slow_step_wait = Duration::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("slow_step_wait"), "{err}");

        let mut config = OperatorConfig::default();
        config.step_cost.fast_step_wait = MAX_STEP_WAIT + Duration::from_secs(1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fast_step_wait"), "{err}");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: OperatorConfig =
            serde_json::from_str(r#"{"expire_after":{"secs":5,"nanos":0}}"#).unwrap();
        assert_eq!(config.expire_after, Duration::from_secs(5));
        assert_eq!(config.step_cost, StepCostModel::default());
    }
}
