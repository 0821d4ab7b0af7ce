//! # Notiflow Executor
//!
//! Step execution core: rebuilds the state of a workflow run from its job
//! chain, resolves control values, dispatches the step to a bridge and writes
//! the audit trail.
//!
//! ## Components
//! - [`chain::JobChainReader`] walks a job's ancestors.
//! - [`outputs::StepOutputMapper`] derives each ancestor's outputs.
//! - [`state::ExecutionStateBuilder`] assembles the replay state.
//! - [`controls::ControlValueResolver`] loads and sanitizes step controls.
//! - [`dispatch::BridgeDispatcher`] runs one job end to end.
//! - [`bridge::HttpBridgeExecutor`] signs and sends requests over HTTP.
//! - [`audit::ExecutionAuditRecorder`] appends execution details.
//! - [`worker::Worker`] drains the queued jobs.

pub mod audit;
pub mod bridge;
pub mod chain;
pub mod controls;
pub mod dispatch;
pub mod outputs;
pub mod sanitize;
pub mod state;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use audit::ExecutionAuditRecorder;
pub use bridge::HttpBridgeExecutor;
pub use chain::JobChainReader;
pub use controls::ControlValueResolver;
pub use dispatch::BridgeDispatcher;
pub use outputs::StepOutputMapper;
pub use sanitize::DashboardSanitizer;
pub use state::ExecutionStateBuilder;
pub use worker::{Worker, WorkerReport, spawn_worker};
