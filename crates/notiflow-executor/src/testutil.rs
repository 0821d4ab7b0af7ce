//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::{
    BridgeErrorHook, BridgeExecutor, ControlValuesStore, EnvironmentStore, ExecutionDetailSink,
    JobStore, MessageStore, WorkflowStore,
};
use notiflow_core::types::{
    BridgeFailure, BridgeRequest, ControlValues, ControlValuesLevel, Environment, ExecutionDetail,
    ExecutionOutput, InAppMessage, Job, JobStatus, JobStep, StepKind, Workflow, WorkflowOrigin,
    WorkflowType,
};
use notiflow_store::SqliteStore;

pub(crate) fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

/// Completed job in `env-1`/`wf-1` whose user-facing step id is `step_id`.
pub(crate) fn job_with_parent(kind: StepKind, step_id: &str, parent: Option<&str>) -> Job {
    let step = JobStep {
        id: format!("st-{step_id}"),
        step_id: Some(step_id.to_string()),
        ..JobStep::default()
    };
    let mut job = Job::new("env-1", "wf-1", kind, step);
    job.organization_id = "org-1".into();
    job.subscriber_id = "sub-1".into();
    job.transaction_id = "txn-1".into();
    job.parent_id = parent.map(str::to_string);
    job.status = JobStatus::Completed;
    job
}

pub(crate) fn workflow(origin: WorkflowOrigin) -> Workflow {
    Workflow {
        id: "wf-1".into(),
        environment_id: "env-1".into(),
        name: "Order shipped".into(),
        trigger_identifiers: vec!["order-shipped".into()],
        origin,
        kind: WorkflowType::Bridge,
    }
}

pub(crate) fn environment(bridge_url: Option<&str>) -> Environment {
    Environment {
        id: "env-1".into(),
        organization_id: "org-1".into(),
        name: "Development".into(),
        bridge_url: bridge_url.map(str::to_string),
        api_key: "sk_test_123".into(),
    }
}

/// Store whose every call fails.
pub(crate) struct FailingStore;

fn unavailable<T>() -> Result<T> {
    Err(NotiflowError::store("store unavailable"))
}

#[async_trait]
impl JobStore for FailingStore {
    async fn find_job(&self, _: &str, _: &str) -> Result<Option<Job>> {
        unavailable()
    }

    async fn find_merged_jobs(&self, _: &str, _: &str) -> Result<Vec<Job>> {
        unavailable()
    }

    async fn list_jobs_by_status(&self, _: JobStatus, _: usize) -> Result<Vec<Job>> {
        unavailable()
    }

    async fn update_status(&self, _: &str, _: &str, _: JobStatus, _: Option<Value>) -> Result<()> {
        unavailable()
    }

    async fn increment_attempts(&self, _: &str, _: &str) -> Result<u32> {
        unavailable()
    }
}

#[async_trait]
impl EnvironmentStore for FailingStore {
    async fn find_environment(&self, _: &str) -> Result<Option<Environment>> {
        unavailable()
    }
}

#[async_trait]
impl WorkflowStore for FailingStore {
    async fn find_workflow(&self, _: &str, _: &str, _: &[WorkflowType]) -> Result<Option<Workflow>> {
        unavailable()
    }
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn find_message_for_job(&self, _: &str, _: &str, _: &str) -> Result<Option<InAppMessage>> {
        unavailable()
    }
}

#[async_trait]
impl ControlValuesStore for FailingStore {
    async fn find_control_values(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: ControlValuesLevel,
    ) -> Result<Option<ControlValues>> {
        unavailable()
    }
}

#[async_trait]
impl ExecutionDetailSink for FailingStore {
    async fn append(&self, _: &ExecutionDetail) -> Result<()> {
        unavailable()
    }

    async fn list_for_job(&self, _: &str, _: &str) -> Result<Vec<ExecutionDetail>> {
        unavailable()
    }
}

/// Executor that captures requests and answers with a fixed outcome.
pub(crate) struct RecordingExecutor {
    outcome: std::result::Result<ExecutionOutput, BridgeFailure>,
    requests: Mutex<Vec<BridgeRequest>>,
}

impl RecordingExecutor {
    pub(crate) fn ok(body: Value) -> Self {
        Self {
            outcome: Ok(serde_json::from_value(body).unwrap()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(failure: BridgeFailure) -> Self {
        Self {
            outcome: Err(failure),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<BridgeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeExecutor for RecordingExecutor {
    async fn execute(
        &self,
        request: BridgeRequest,
        on_error: &dyn BridgeErrorHook,
    ) -> Result<ExecutionOutput> {
        self.requests.lock().unwrap().push(request);
        match &self.outcome {
            Ok(output) => Ok(output.clone()),
            Err(failure) => {
                on_error.on_error(failure).await;
                Err(NotiflowError::Bridge(failure.clone()))
            }
        }
    }
}
