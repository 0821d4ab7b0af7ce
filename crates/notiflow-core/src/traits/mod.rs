pub mod executor;
pub mod store;

pub use executor::{BridgeErrorHook, BridgeExecutor, ControlSanitizer};
pub use store::{
    ControlValuesStore, EnvironmentStore, ExecutionDetailSink, JobStore, MessageStore,
    WorkflowStore,
};
