//! Job records: one unit of work for one step of one workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload key the trigger pipeline uses to tag where an event came from.
/// Never forwarded to step executors.
pub const PAYLOAD_SOURCE_KEY: &str = "__source";

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Merged,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Merged => "merged",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step type. Closed set; anything the platform adds later deserializes
/// as `Unknown` and maps to an empty output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Trigger,
    Delay,
    Digest,
    InApp,
    Email,
    Sms,
    Chat,
    Push,
    Throttle,
    Custom,
    #[serde(other)]
    Unknown,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Trigger => "trigger",
            StepKind::Delay => "delay",
            StepKind::Digest => "digest",
            StepKind::InApp => "in_app",
            StepKind::Email => "email",
            StepKind::Sms => "sms",
            StepKind::Chat => "chat",
            StepKind::Push => "push",
            StepKind::Throttle => "throttle",
            StepKind::Custom => "custom",
            StepKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step descriptor snapshotted onto a job when it was scheduled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStep {
    /// Persisted step id inside the workflow definition.
    pub id: String,
    /// User-facing step identifier (what bridge code references).
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Ad-hoc bridge endpoint. Present only for stateless (preview/test) runs.
    #[serde(default)]
    pub bridge_url: Option<String>,
    /// Controls attached up front to stateless jobs.
    #[serde(default)]
    pub control_variables: Option<Value>,
}

impl JobStep {
    /// Identifier used to address the step over the bridge.
    pub fn resolved_step_id(&self) -> Option<&str> {
        [self.step_id.as_deref(), self.uuid.as_deref()]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
    }

    /// A blank bridge URL counts as absent.
    pub fn is_stateless(&self) -> bool {
        self.bridge_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// A persisted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub notification_id: String,
    pub workflow_id: String,
    pub environment_id: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub subscriber_id: String,
    /// `None` marks the first job of a run.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub status: JobStatus,
    pub kind: StepKind,
    pub step: JobStep,
    #[serde(default)]
    pub payload: Value,
    /// Subscriber snapshot taken at trigger time.
    #[serde(default)]
    pub subscriber: Value,
    /// Value produced by a custom step, stored after it ran.
    #[serde(default)]
    pub step_output: Option<Value>,
    /// Winning digest job this job was merged into.
    #[serde(default)]
    pub merged_digest_id: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    /// Dispatch attempts made by the worker so far.
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// New pending job for `kind`, stamped now. Callers fill in the run
    /// identifiers they need.
    pub fn new(environment_id: &str, workflow_id: &str, kind: StepKind, step: JobStep) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: String::new(),
            notification_id: String::new(),
            workflow_id: workflow_id.to_string(),
            environment_id: environment_id.to_string(),
            organization_id: String::new(),
            subscriber_id: String::new(),
            parent_id: None,
            status: JobStatus::Pending,
            kind,
            step,
            payload: Value::Object(Default::default()),
            subscriber: Value::Object(Default::default()),
            step_output: None,
            merged_digest_id: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_stateful(&self) -> bool {
        !self.step.is_stateless()
    }
}
