//! Operator execution: steps, status lifecycle, influence and records.

pub mod config;
pub mod engine;
pub mod influence;
pub mod kind;
pub mod observer;
pub mod record;
pub mod status;
pub mod step;

pub use config::{DEFAULT_EXPIRE_AFTER, MAX_STEP_WAIT, OperatorConfig, StepCostModel};
pub use engine::{
    CANCEL_REASON_KEY, CancelReason, OP_DESC_LEAVE_JOINT_STATE, Operator, OperatorBuilder,
    OperatorCounter,
};
pub use influence::{OpInfluence, StoreInfluence, StoreLimitType};
pub use kind::OpKind;
pub use observer::{
    MetricsStepObserver, NoopStepObserver, RecordingStepObserver, StepDurationObserver,
};
pub use record::{OpHistory, OpRecord};
pub use status::{OpStatus, OpStatusTracker};
pub use step::{
    AddLearner, AddPeer, BecomeNonWitness, BecomeWitness, ChangePeerV2Enter, ChangePeerV2Leave,
    DemoteVoter, OpStep, OpStepKind, PromoteLearner, RemovePeer, TransferLeader,
};
