//! Store traits: narrow read interfaces over persisted records plus the
//! append-only execution-detail sink.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    ControlValues, ControlValuesLevel, Environment, ExecutionDetail, InAppMessage, Job, JobStatus,
    Workflow, WorkflowType,
};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Point lookup scoped to the tenant environment.
    async fn find_job(&self, environment_id: &str, job_id: &str) -> Result<Option<Job>>;

    /// Jobs in `merged` status folded into the given digest job.
    async fn find_merged_jobs(&self, environment_id: &str, digest_job_id: &str) -> Result<Vec<Job>>;

    /// Oldest jobs in `status`, across environments, up to `limit`.
    async fn list_jobs_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>>;

    async fn update_status(
        &self,
        environment_id: &str,
        job_id: &str,
        status: JobStatus,
        error: Option<Value>,
    ) -> Result<()>;

    /// Increments the dispatch attempt counter and returns the new value.
    async fn increment_attempts(&self, environment_id: &str, job_id: &str) -> Result<u32>;
}

#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn find_environment(&self, environment_id: &str) -> Result<Option<Environment>>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Lookup restricted to workflows whose type is in `types`.
    async fn find_workflow(
        &self,
        environment_id: &str,
        workflow_id: &str,
        types: &[WorkflowType],
    ) -> Result<Option<Workflow>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_message_for_job(
        &self,
        environment_id: &str,
        subscriber_id: &str,
        job_id: &str,
    ) -> Result<Option<InAppMessage>>;
}

#[async_trait]
pub trait ControlValuesStore: Send + Sync {
    async fn find_control_values(
        &self,
        environment_id: &str,
        workflow_id: &str,
        step_id: &str,
        level: ControlValuesLevel,
    ) -> Result<Option<ControlValues>>;
}

#[async_trait]
pub trait ExecutionDetailSink: Send + Sync {
    /// Appends a record. Never updates an existing one.
    async fn append(&self, detail: &ExecutionDetail) -> Result<()>;

    async fn list_for_job(&self, environment_id: &str, job_id: &str) -> Result<Vec<ExecutionDetail>>;
}
