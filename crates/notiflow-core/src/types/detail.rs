//! Execution details: the append-only audit trail of dispatch attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Job, StepKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    /// The bridge call round-tripped; the step's own outcome is decided later.
    BridgeResponseReceived,
    BridgeExecutionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSource {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

/// Job identifiers copied onto every detail so the activity feed can be
/// queried without joining back to jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: String,
    pub environment_id: String,
    pub organization_id: String,
    pub subscriber_id: String,
    pub notification_id: String,
    pub workflow_id: String,
    pub transaction_id: String,
    pub step_kind: StepKind,
}

impl From<&Job> for JobContext {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            environment_id: job.environment_id.clone(),
            organization_id: job.organization_id.clone(),
            subscriber_id: job.subscriber_id.clone(),
            notification_id: job.notification_id.clone(),
            workflow_id: job.workflow_id.clone(),
            transaction_id: job.transaction_id.clone(),
            step_kind: job.kind,
        }
    }
}

/// What a caller hands to the audit recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExecutionDetail {
    pub context: JobContext,
    pub detail: DetailKind,
    pub source: ExecutionSource,
    pub status: ExecutionStatus,
    pub is_test: bool,
    pub is_retry: bool,
    /// Serialized JSON describing the response or the failure.
    pub raw: Option<String>,
}

impl NewExecutionDetail {
    pub fn for_job(
        job: &Job,
        detail: DetailKind,
        source: ExecutionSource,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            context: JobContext::from(job),
            detail,
            source,
            status,
            is_test: false,
            is_retry: false,
            raw: None,
        }
    }

    pub fn with_retry(mut self, is_retry: bool) -> Self {
        self.is_retry = is_retry;
        self
    }

    pub fn with_raw(mut self, raw: &serde_json::Value) -> Self {
        self.raw = Some(raw.to_string());
        self
    }
}

/// A stored execution detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub id: String,
    #[serde(flatten)]
    pub context: JobContext,
    pub detail: DetailKind,
    pub source: ExecutionSource,
    pub status: ExecutionStatus,
    pub is_test: bool,
    pub is_retry: bool,
    pub raw: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionDetail {
    /// Stamp a new record with an id and creation time.
    pub fn create(new: NewExecutionDetail) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            context: new.context,
            detail: new.detail,
            source: new.source,
            status: new.status,
            is_test: new.is_test,
            is_retry: new.is_retry,
            raw: new.raw,
            created_at: Utc::now(),
        }
    }
}
