//! Bridge dispatch: assembles the execution request for one dequeued job,
//! sends it to the internal executor or the customer's bridge, and records
//! the outcome.
//!
//! ## Flow
//! ```text
//! Job
//!   → stateful? (no ad-hoc bridge URL) → load bridge workflow, absent → None
//!   → step id, environment, bridge URL checks (fatal)
//!   → payload without `__source`
//!   → state (stateful only) + controls
//!   → BridgeExecutor.execute(EXECUTE)
//!       ├── ok  → detail: bridge_response_received / pending
//!       └── err → detail: bridge_execution_failed / failed (via error hook)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::{
    BridgeErrorHook, BridgeExecutor, ControlSanitizer, ControlValuesStore, EnvironmentStore,
    ExecutionDetailSink, JobStore, MessageStore, WorkflowStore,
};
use notiflow_core::types::{
    BridgeAction, BridgeEvent, BridgeFailure, BridgeRequest, DetailKind, ExecutionOutput,
    ExecutionSource, ExecutionStateEntry, ExecutionStatus, Job, NewExecutionDetail,
    PAYLOAD_SOURCE_KEY, RoutingParams, WorkflowOrigin, WorkflowType,
};

use crate::audit::ExecutionAuditRecorder;
use crate::chain::JobChainReader;
use crate::controls::ControlValueResolver;
use crate::outputs::StepOutputMapper;
use crate::state::ExecutionStateBuilder;

/// Workflow types a stateful job may resolve against.
const EXECUTABLE_WORKFLOW_TYPES: &[WorkflowType] = &[WorkflowType::Bridge];

pub struct BridgeDispatcher {
    workflows: Arc<dyn WorkflowStore>,
    environments: Arc<dyn EnvironmentStore>,
    state: ExecutionStateBuilder,
    controls: ControlValueResolver,
    executor: Arc<dyn BridgeExecutor>,
    audit: ExecutionAuditRecorder,
}

impl BridgeDispatcher {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        environments: Arc<dyn EnvironmentStore>,
        state: ExecutionStateBuilder,
        controls: ControlValueResolver,
        executor: Arc<dyn BridgeExecutor>,
        audit: ExecutionAuditRecorder,
    ) -> Self {
        Self {
            workflows,
            environments,
            state,
            controls,
            executor,
            audit,
        }
    }

    /// Wire every component to one store that implements all the store traits.
    pub fn from_store<S>(
        store: Arc<S>,
        executor: Arc<dyn BridgeExecutor>,
        sanitizer: Arc<dyn ControlSanitizer>,
        max_chain_depth: usize,
    ) -> Self
    where
        S: JobStore
            + EnvironmentStore
            + WorkflowStore
            + MessageStore
            + ControlValuesStore
            + ExecutionDetailSink
            + 'static,
    {
        let state = ExecutionStateBuilder::new(
            JobChainReader::new(store.clone(), max_chain_depth),
            StepOutputMapper::new(store.clone(), store.clone()),
        );
        let controls = ControlValueResolver::new(store.clone(), sanitizer);
        let audit = ExecutionAuditRecorder::new(store.clone());
        Self::new(store.clone(), store, state, controls, executor, audit)
    }

    /// Assembled state for `job` without dispatching anything.
    pub async fn preview_state(&self, job: &Job) -> Result<Vec<ExecutionStateEntry>> {
        self.state.build_state(job).await
    }

    /// Execute one job.
    ///
    /// `Ok(None)` means the job's workflow no longer exists (deleted after
    /// scheduling) and there is nothing to do. Missing step ids, environments
    /// and bridge URLs are fatal. Executor failures are recorded as a failed
    /// execution detail before the executor's error is returned. Details are
    /// sourced `internal` when the platform's own executor ran the step.
    pub async fn execute(&self, job: &Job) -> Result<Option<ExecutionOutput>> {
        let stateful = job.is_stateful();

        let workflow = if stateful {
            let found = self
                .workflows
                .find_workflow(&job.environment_id, &job.workflow_id, EXECUTABLE_WORKFLOW_TYPES)
                .await?;
            match found {
                Some(workflow) => Some(workflow),
                None => {
                    tracing::debug!(
                        "Workflow {} for job {} no longer exists, skipping",
                        job.workflow_id,
                        job.id
                    );
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let step_id = job
            .step
            .resolved_step_id()
            .ok_or_else(|| NotiflowError::StepIdMissing {
                job_id: job.id.clone(),
            })?
            .to_string();

        let environment = self
            .environments
            .find_environment(&job.environment_id)
            .await?
            .ok_or_else(|| NotiflowError::EnvironmentNotFound(job.environment_id.clone()))?;

        if let Some(workflow) = &workflow {
            let has_bridge_url = environment
                .bridge_url
                .as_deref()
                .is_some_and(|url| !url.is_empty());
            if workflow.origin == WorkflowOrigin::External && !has_bridge_url {
                return Err(NotiflowError::BridgeUrlMissing {
                    environment_id: environment.id.clone(),
                    workflow_id: workflow.id.clone(),
                });
            }
        }

        let payload = normalize_payload(&job.payload);

        let (state, controls) = match &workflow {
            Some(workflow) => (
                self.state.build_state(job).await?,
                self.controls.resolve(job, workflow).await?,
            ),
            None => (
                Vec::new(),
                job.step
                    .control_variables
                    .clone()
                    .unwrap_or_else(empty_object),
            ),
        };

        let subscriber = if job.subscriber.is_null() {
            empty_object()
        } else {
            job.subscriber.clone()
        };

        let request = BridgeRequest {
            target_url: job.step.bridge_url.clone().filter(|url| !url.is_empty()),
            event: BridgeEvent {
                payload,
                controls,
                state,
                subscriber,
            },
            action: BridgeAction::Execute,
            routing: RoutingParams {
                workflow_id: job.workflow_id.clone(),
                step_id,
                job_id: job.id.clone(),
            },
            workflow_origin: workflow.as_ref().map(|w| w.origin),
            environment_id: environment.id.clone(),
            bridge_url: environment.bridge_url.clone(),
            signing_key: environment.api_key.clone(),
        };

        let source = if request.targets_internal_executor() {
            ExecutionSource::Internal
        } else {
            ExecutionSource::External
        };
        // `attempts` counts dispatches made before this one.
        let is_retry = job.attempts > 0;

        tracing::info!(
            "🚀 Dispatching job {} (step '{}', {} prior steps)",
            job.id,
            request.routing.step_id,
            request.event.state.len()
        );

        let hook = FailureRecorder {
            job,
            source,
            is_retry,
            audit: &self.audit,
        };
        let output = self.executor.execute(request, &hook).await?;

        let raw = serde_json::to_value(&output)?;
        self.audit
            .record(
                NewExecutionDetail::for_job(
                    job,
                    DetailKind::BridgeResponseReceived,
                    source,
                    ExecutionStatus::Pending,
                )
                .with_retry(is_retry)
                .with_raw(&raw),
            )
            .await;

        if output.is_error() {
            tracing::warn!("⚠️ Bridge reported job {} as errored", job.id);
        } else if output.is_skipped() {
            tracing::info!("⏭️ Bridge skipped job {}", job.id);
        } else {
            tracing::info!("✅ Bridge response received for job {}", job.id);
        }
        Ok(Some(output))
    }
}

/// Writes the failure detail when the executor reports an error.
struct FailureRecorder<'a> {
    job: &'a Job,
    source: ExecutionSource,
    is_retry: bool,
    audit: &'a ExecutionAuditRecorder,
}

#[async_trait]
impl BridgeErrorHook for FailureRecorder<'_> {
    async fn on_error(&self, failure: &BridgeFailure) {
        tracing::warn!("❌ Bridge execution failed for job {}: {}", self.job.id, failure);
        self.audit
            .record(
                NewExecutionDetail::for_job(
                    self.job,
                    DetailKind::BridgeExecutionFailed,
                    self.source,
                    ExecutionStatus::Failed,
                )
                .with_retry(self.is_retry)
                .with_raw(&failure.to_raw()),
            )
            .await;
    }
}

/// Removes internal bookkeeping from the trigger payload.
fn normalize_payload(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove(PAYLOAD_SOURCE_KEY);
            Value::Object(map)
        }
        _ => empty_object(),
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
