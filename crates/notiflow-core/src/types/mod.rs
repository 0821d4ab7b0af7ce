//! Domain types shared across crates.

pub mod bridge;
pub mod detail;
pub mod job;
pub mod workflow;

pub use bridge::{
    BridgeAction, BridgeErrorCode, BridgeEvent, BridgeFailure, BridgeRequest, ExecutionMetadata,
    ExecutionOptions, ExecutionOutput, ExecutionStateEntry, RoutingParams, StepState,
};
pub use detail::{
    DetailKind, ExecutionDetail, ExecutionSource, ExecutionStatus, JobContext, NewExecutionDetail,
};
pub use job::{Job, JobStatus, JobStep, PAYLOAD_SOURCE_KEY, StepKind};
pub use workflow::{
    ControlValues, ControlValuesLevel, Environment, InAppMessage, Workflow, WorkflowOrigin,
    WorkflowType,
};
