//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use notiflow_core::error::Result;
use notiflow_core::traits::{BridgeErrorHook, BridgeExecutor};
use notiflow_core::types::{
    BridgeRequest, Environment, ExecutionOutput, Job, JobStatus, JobStep, StepKind, Workflow,
    WorkflowOrigin, WorkflowType,
};
use notiflow_executor::{BridgeDispatcher, DashboardSanitizer};
use notiflow_store::SqliteStore;

pub const ENV: &str = "env-e2e";
pub const WORKFLOW: &str = "wf-order-shipped";

/// Store seeded with one environment and one bridge workflow.
pub fn seeded_store(origin: WorkflowOrigin, bridge_url: Option<&str>) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .save_environment(&Environment {
            id: ENV.into(),
            organization_id: "org-e2e".into(),
            name: "Production".into(),
            bridge_url: bridge_url.map(str::to_string),
            api_key: "sk_live_e2e".into(),
        })
        .unwrap();
    store
        .save_workflow(&Workflow {
            id: WORKFLOW.into(),
            environment_id: ENV.into(),
            name: "Order shipped".into(),
            trigger_identifiers: vec!["order-shipped".into()],
            origin,
            kind: WorkflowType::Bridge,
        })
        .unwrap();
    store
}

/// Job of `kind` created `age_secs` ago in the seeded workflow.
pub fn job(kind: StepKind, step_id: &str, parent: Option<&Job>, age_secs: i64) -> Job {
    let step = JobStep {
        id: format!("st-{step_id}"),
        step_id: Some(step_id.to_string()),
        ..JobStep::default()
    };
    let mut job = Job::new(ENV, WORKFLOW, kind, step);
    job.organization_id = "org-e2e".into();
    job.subscriber_id = "sub-e2e".into();
    job.transaction_id = "txn-e2e".into();
    job.parent_id = parent.map(|p| p.id.clone());
    job.status = JobStatus::Completed;
    job.created_at = Utc::now() - Duration::seconds(age_secs);
    job.updated_at = job.created_at;
    job
}

/// Executor that records every request and answers with empty outputs.
#[derive(Default)]
pub struct CapturingExecutor {
    pub requests: Mutex<Vec<BridgeRequest>>,
}

#[async_trait]
impl BridgeExecutor for CapturingExecutor {
    async fn execute(&self, request: BridgeRequest, _: &dyn BridgeErrorHook) -> Result<ExecutionOutput> {
        self.requests.lock().unwrap().push(request);
        Ok(ExecutionOutput::default())
    }
}

pub fn dispatcher(store: &Arc<SqliteStore>, executor: Arc<dyn BridgeExecutor>) -> BridgeDispatcher {
    BridgeDispatcher::from_store(store.clone(), executor, Arc::new(DashboardSanitizer), 20)
}
