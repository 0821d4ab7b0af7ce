//! Wire shapes exchanged with step executors.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::job::JobStatus;
use super::workflow::WorkflowOrigin;

/// Action requested from the executor. Only step execution is dispatched
/// from the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeAction {
    Execute,
}

impl BridgeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeAction::Execute => "execute",
        }
    }
}

/// Routing metadata sent as query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingParams {
    pub workflow_id: String,
    pub step_id: String,
    pub job_id: String,
}

/// Outcome of one prior step as seen by later steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStateEntry {
    pub step_id: String,
    pub outputs: Value,
    pub state: StepState,
}

/// Body of an execute request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub payload: Value,
    pub controls: Value,
    pub state: Vec<ExecutionStateEntry>,
    pub subscriber: Value,
}

/// Everything an executor needs to run one step.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    /// Ad-hoc endpoint of a stateless job; `None` routes by workflow origin.
    pub target_url: Option<String>,
    pub event: BridgeEvent,
    pub action: BridgeAction,
    pub routing: RoutingParams,
    pub workflow_origin: Option<WorkflowOrigin>,
    pub environment_id: String,
    /// Customer bridge registered on the environment.
    pub bridge_url: Option<String>,
    /// Environment secret the request body is signed with.
    pub signing_key: String,
}

impl BridgeRequest {
    /// The request goes to the platform's own executor: no ad-hoc endpoint
    /// and not an externally authored workflow.
    pub fn targets_internal_executor(&self) -> bool {
        self.target_url.as_deref().is_none_or(str::is_empty)
            && self.workflow_origin != Some(WorkflowOrigin::External)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: bool,
    /// Milliseconds the executor spent on the step.
    #[serde(default)]
    pub duration: u64,
}

/// Executor response. Every field is defaulted so partial bodies parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(default)]
    pub outputs: Value,
    #[serde(default)]
    pub providers: Value,
    #[serde(default)]
    pub options: ExecutionOptions,
    #[serde(default)]
    pub metadata: ExecutionMetadata,
}

impl ExecutionOutput {
    pub fn is_skipped(&self) -> bool {
        self.options.skip
    }

    /// The executor reported the step itself as failed.
    pub fn is_error(&self) -> bool {
        self.metadata.error
    }
}

/// Classification of a failed bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeErrorCode {
    EndpointNotFound,
    EndpointUnavailable,
    RequestTimeout,
    InvalidResponse,
    ExecutionFailed,
}

impl BridgeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeErrorCode::EndpointNotFound => "BRIDGE_ENDPOINT_NOT_FOUND",
            BridgeErrorCode::EndpointUnavailable => "BRIDGE_ENDPOINT_UNAVAILABLE",
            BridgeErrorCode::RequestTimeout => "BRIDGE_REQUEST_TIMEOUT",
            BridgeErrorCode::InvalidResponse => "BRIDGE_INVALID_RESPONSE",
            BridgeErrorCode::ExecutionFailed => "BRIDGE_EXECUTION_FAILED",
        }
    }
}

/// Transport-level description of a failed bridge call, detailed enough to
/// diagnose without replaying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeFailure {
    pub url: String,
    pub status_code: Option<u16>,
    pub code: BridgeErrorCode,
    pub message: String,
    /// Error code reported by the bridge itself, if its body carried one.
    pub provider_code: Option<String>,
    pub data: Option<Value>,
    pub cause: Option<String>,
}

impl BridgeFailure {
    pub fn new(url: &str, code: BridgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status_code: None,
            code,
            message: message.into(),
            provider_code: None,
            data: None,
            cause: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.provider_code = data
            .get("code")
            .and_then(|c| c.as_str())
            .map(String::from);
        self.data = Some(data);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Shape persisted in the failure detail's `raw` field.
    pub fn to_raw(&self) -> Value {
        json!({
            "url": self.url,
            "statusCode": self.status_code,
            "message": self.message,
            "code": self.provider_code.as_deref().unwrap_or(self.code.as_str()),
            "data": self.data,
            "cause": self.cause,
        })
    }
}

impl std::fmt::Display for BridgeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "{} ({status}) {}: {}", self.code.as_str(), self.url, self.message),
            None => write!(f, "{} {}: {}", self.code.as_str(), self.url, self.message),
        }
    }
}
