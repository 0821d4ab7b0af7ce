//! Workflow definitions, environments, control values and in-app messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored the workflow code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOrigin {
    /// Built in the platform's own editor.
    Platform,
    /// Code owned and hosted by the customer.
    External,
}

/// How the workflow's steps are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Regular,
    Bridge,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Regular => "regular",
            WorkflowType::Bridge => "bridge",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub environment_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub trigger_identifiers: Vec<String>,
    pub origin: WorkflowOrigin,
    pub kind: WorkflowType,
}

/// Tenant/stage boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    /// Base URL of the customer's bridge endpoint, if one is registered.
    #[serde(default)]
    pub bridge_url: Option<String>,
    /// Secret used to sign outbound bridge calls.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlValuesLevel {
    StepControls,
    LayoutControls,
}

impl ControlValuesLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlValuesLevel::StepControls => "step_controls",
            ControlValuesLevel::LayoutControls => "layout_controls",
        }
    }
}

/// Per-step, per-environment configuration blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlValues {
    pub id: String,
    pub environment_id: String,
    #[serde(default)]
    pub organization_id: String,
    pub workflow_id: String,
    /// Persisted step id (`JobStep::id`).
    pub step_id: String,
    pub level: ControlValuesLevel,
    #[serde(default)]
    pub controls: Value,
    pub updated_at: DateTime<Utc>,
}

/// Message created by an in-app step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InAppMessage {
    pub id: String,
    pub job_id: String,
    pub environment_id: String,
    pub subscriber_id: String,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub last_seen_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_read_date: Option<DateTime<Utc>>,
}
