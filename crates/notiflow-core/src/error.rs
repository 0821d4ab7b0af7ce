//! Error types shared by every Notiflow crate.

use crate::types::BridgeFailure;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, NotiflowError>;

#[derive(Debug, thiserror::Error)]
pub enum NotiflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Step ID (or UUID) is not defined for job {job_id}")]
    StepIdMissing { job_id: String },

    #[error("Environment {0} is not found")]
    EnvironmentNotFound(String),

    #[error("Bridge URL is not set for environment {environment_id} (workflow {workflow_id})")]
    BridgeUrlMissing {
        environment_id: String,
        workflow_id: String,
    },

    #[error("Job chain for {job_id} exceeds the maximum depth of {max_depth}")]
    ChainTooDeep { job_id: String, max_depth: usize },

    #[error("Bridge execution failed: {0}")]
    Bridge(BridgeFailure),

    #[error("{0}")]
    Other(String),
}

impl NotiflowError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Fatal errors cannot resolve by re-running the same job; the queue
    /// should move the job to a terminal state instead of retrying it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::StepIdMissing { .. }
                | Self::EnvironmentNotFound(_)
                | Self::BridgeUrlMissing { .. }
                | Self::ChainTooDeep { .. }
        )
    }
}
