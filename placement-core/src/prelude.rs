pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{OperatorError, Result as OperatorResult};
pub use crate::operator::{
    CancelReason, OpHistory, OpInfluence, OpKind, OpRecord, OpStatus, OpStep, OpStepKind,
    Operator, OperatorBuilder, OperatorConfig, StepCostModel, StepDurationObserver,
};
pub use placement_model::prelude::*;
