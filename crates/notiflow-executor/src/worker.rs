//! Queue worker: polls the job store for queued jobs, dispatches them one at
//! a time and settles each job's status. Jobs left `running` by a crashed or
//! interrupted pass are requeued once they go stale.

use std::sync::Arc;

use serde_json::{Value, json};

use notiflow_core::config::WorkerConfig;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::JobStore;
use notiflow_core::types::{Job, JobStatus};

use crate::dispatch::BridgeDispatcher;

/// Counts from one polling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub reclaimed: usize,
    pub completed: usize,
    pub requeued: usize,
    pub failed: usize,
}

impl WorkerReport {
    pub fn total(&self) -> usize {
        self.completed + self.requeued + self.failed
    }
}

pub struct Worker {
    jobs: Arc<dyn JobStore>,
    dispatcher: Arc<BridgeDispatcher>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(jobs: Arc<dyn JobStore>, dispatcher: Arc<BridgeDispatcher>, config: WorkerConfig) -> Self {
        Self {
            jobs,
            dispatcher,
            config,
        }
    }

    /// Claim and run one batch of queued jobs.
    pub async fn run_once(&self) -> Result<WorkerReport> {
        let mut report = WorkerReport {
            reclaimed: self.reclaim_stale().await?,
            ..WorkerReport::default()
        };

        let queued = self
            .jobs
            .list_jobs_by_status(JobStatus::Queued, self.config.batch_size)
            .await?;

        for job in queued {
            match self.process(&job).await {
                Ok(JobStatus::Completed) => report.completed += 1,
                Ok(JobStatus::Queued) => report.requeued += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Could not settle job {}: {}", job.id, e);
                }
            }
        }

        if report.total() > 0 || report.reclaimed > 0 {
            tracing::info!(
                "📬 Worker pass: {} completed, {} requeued, {} failed, {} reclaimed",
                report.completed,
                report.requeued,
                report.failed,
                report.reclaimed
            );
        }
        Ok(report)
    }

    /// Requeue running jobs whose last update is older than `stale_after_secs`.
    async fn reclaim_stale(&self) -> Result<usize> {
        let cutoff = chrono::Duration::from_std(std::time::Duration::from_secs(self.config.stale_after_secs))
            .ok()
            .and_then(|stale| chrono::Utc::now().checked_sub_signed(stale));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        let running = self
            .jobs
            .list_jobs_by_status(JobStatus::Running, self.config.batch_size)
            .await?;

        let mut reclaimed = 0;
        for job in running.into_iter().filter(|job| job.updated_at <= cutoff) {
            match self
                .jobs
                .update_status(&job.environment_id, &job.id, JobStatus::Queued, None)
                .await
            {
                Ok(()) => {
                    tracing::warn!("♻️ Requeued stale running job {}", job.id);
                    reclaimed += 1;
                }
                Err(e) => tracing::warn!("⚠️ Could not requeue stale job {}: {}", job.id, e),
            }
        }
        Ok(reclaimed)
    }

    /// Run one job and return the status it was left in. A job that was
    /// claimed but could not be settled goes back to `queued`.
    async fn process(&self, job: &Job) -> Result<JobStatus> {
        self.jobs
            .update_status(&job.environment_id, &job.id, JobStatus::Running, None)
            .await?;

        match self.run_claimed(job).await {
            Ok(status) => Ok(status),
            Err(e) => {
                if let Err(release) = self
                    .jobs
                    .update_status(&job.environment_id, &job.id, JobStatus::Queued, None)
                    .await
                {
                    tracing::warn!(
                        "⚠️ Job {} stays running until it goes stale: {}",
                        job.id,
                        release
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_claimed(&self, job: &Job) -> Result<JobStatus> {
        let attempts = self
            .jobs
            .increment_attempts(&job.environment_id, &job.id)
            .await?;

        let (status, error) = match self.dispatcher.execute(job).await {
            Ok(_) => (JobStatus::Completed, None),
            Err(e) if e.is_fatal() || attempts >= self.config.max_attempts => {
                tracing::error!(
                    "❌ Job {} failed after {} attempt(s): {}",
                    job.id,
                    attempts,
                    e
                );
                (JobStatus::Failed, Some(error_json(&e)))
            }
            Err(e) => {
                tracing::warn!(
                    "🔁 Job {} attempt {}/{} failed, requeueing: {}",
                    job.id,
                    attempts,
                    self.config.max_attempts,
                    e
                );
                (JobStatus::Queued, None)
            }
        };

        self.jobs
            .update_status(&job.environment_id, &job.id, status, error)
            .await?;
        Ok(status)
    }
}

fn error_json(error: &NotiflowError) -> Value {
    match error {
        NotiflowError::Bridge(failure) => failure.to_raw(),
        other => json!({
            "message": other.to_string(),
            "fatal": other.is_fatal(),
        }),
    }
}

/// Poll forever at the configured interval. Errors from a pass are logged
/// and the loop keeps going.
pub async fn spawn_worker(worker: Arc<Worker>) {
    let poll_secs = worker.config.poll_interval_secs.max(1);
    tracing::info!(
        "⏰ Worker started (poll every {}s, batch {})",
        poll_secs,
        worker.config.batch_size
    );

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(poll_secs));
    loop {
        interval.tick().await;
        if let Err(e) = worker.run_once().await {
            tracing::warn!("⚠️ Worker pass failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::DashboardSanitizer;
    use crate::testutil::{RecordingExecutor, environment, job_with_parent, memory_store, workflow};
    use notiflow_core::types::{BridgeErrorCode, BridgeFailure, StepKind, WorkflowOrigin};
    use async_trait::async_trait;
    use notiflow_store::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn worker_config(max_attempts: u32, stale_after_secs: u64) -> WorkerConfig {
        WorkerConfig {
            poll_interval_secs: 1,
            batch_size: 10,
            max_attempts,
            stale_after_secs,
        }
    }

    fn worker_over(
        jobs: Arc<dyn JobStore>,
        store: &Arc<SqliteStore>,
        executor: RecordingExecutor,
        config: WorkerConfig,
    ) -> Worker {
        let dispatcher = BridgeDispatcher::from_store(
            store.clone(),
            Arc::new(executor),
            Arc::new(DashboardSanitizer),
            20,
        );
        Worker::new(jobs, Arc::new(dispatcher), config)
    }

    fn worker(store: &Arc<SqliteStore>, executor: RecordingExecutor, max_attempts: u32) -> Worker {
        worker_over(store.clone(), store, executor, worker_config(max_attempts, 300))
    }

    /// Job store whose settling writes fail while `failures` is above zero.
    /// Claims to `running` always go through.
    struct FlakySettleStore {
        inner: Arc<SqliteStore>,
        failures: AtomicUsize,
    }

    impl FlakySettleStore {
        fn new(inner: &Arc<SqliteStore>, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: inner.clone(),
                failures: AtomicUsize::new(failures),
            })
        }
    }

    #[async_trait]
    impl JobStore for FlakySettleStore {
        async fn find_job(&self, environment_id: &str, job_id: &str) -> Result<Option<Job>> {
            self.inner.find_job(environment_id, job_id).await
        }

        async fn find_merged_jobs(&self, environment_id: &str, digest_job_id: &str) -> Result<Vec<Job>> {
            self.inner.find_merged_jobs(environment_id, digest_job_id).await
        }

        async fn list_jobs_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
            self.inner.list_jobs_by_status(status, limit).await
        }

        async fn update_status(
            &self,
            environment_id: &str,
            job_id: &str,
            status: JobStatus,
            error: Option<Value>,
        ) -> Result<()> {
            if status != JobStatus::Running
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(NotiflowError::Store("database is locked".into()));
            }
            self.inner.update_status(environment_id, job_id, status, error).await
        }

        async fn increment_attempts(&self, environment_id: &str, job_id: &str) -> Result<u32> {
            self.inner.increment_attempts(environment_id, job_id).await
        }
    }

    fn queued_job(store: &SqliteStore) -> Job {
        let mut job = job_with_parent(StepKind::Custom, "custom-step", None);
        job.status = JobStatus::Queued;
        store.save_job(&job).unwrap();
        job
    }

    fn unavailable() -> BridgeFailure {
        BridgeFailure::new("https://acme.dev/api/bridge", BridgeErrorCode::EndpointUnavailable, "down")
            .with_status(503)
    }

    async fn reload(store: &SqliteStore, job: &Job) -> Job {
        store.find_job(&job.environment_id, &job.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_successful_job_completes() {
        let store = memory_store();
        store.save_workflow(&workflow(WorkflowOrigin::Platform)).unwrap();
        store.save_environment(&environment(None)).unwrap();
        let job = queued_job(&store);

        let report = worker(&store, RecordingExecutor::ok(serde_json::json!({})), 3)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.completed, 1);

        let settled = reload(&store, &job).await;
        assert_eq!(settled.status, JobStatus::Completed);
        assert_eq!(settled.attempts, 1);
    }

    #[tokio::test]
    async fn test_deleted_workflow_completes_quietly() {
        let store = memory_store();
        store.save_environment(&environment(None)).unwrap();
        let job = queued_job(&store);

        let report = worker(&store, RecordingExecutor::ok(serde_json::json!({})), 3)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(reload(&store, &job).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_transient_failure_requeues_until_attempts_exhausted() {
        let store = memory_store();
        store.save_workflow(&workflow(WorkflowOrigin::External)).unwrap();
        store.save_environment(&environment(Some("https://acme.dev/api/bridge"))).unwrap();
        let job = queued_job(&store);
        let worker = worker(&store, RecordingExecutor::failing(unavailable()), 2);

        assert_eq!(worker.run_once().await.unwrap().requeued, 1);
        assert_eq!(reload(&store, &job).await.status, JobStatus::Queued);

        assert_eq!(worker.run_once().await.unwrap().failed, 1);
        let settled = reload(&store, &job).await;
        assert_eq!(settled.status, JobStatus::Failed);
        assert_eq!(settled.attempts, 2);
        assert_eq!(settled.error.unwrap()["statusCode"], 503);
    }

    #[tokio::test]
    async fn test_fatal_error_fails_immediately() {
        let store = memory_store();
        store.save_workflow(&workflow(WorkflowOrigin::Platform)).unwrap();
        let job = queued_job(&store);

        let report = worker(&store, RecordingExecutor::ok(serde_json::json!({})), 5)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        let settled = reload(&store, &job).await;
        assert_eq!(settled.status, JobStatus::Failed);
        let error = settled.error.unwrap();
        assert_eq!(error["fatal"], true);
        assert!(error["message"].as_str().unwrap().contains("env-1"));
    }

    #[tokio::test]
    async fn test_only_queued_jobs_are_claimed() {
        let store = memory_store();
        let settled = job_with_parent(StepKind::Custom, "custom-step", None);
        store.save_job(&settled).unwrap();

        let report = worker(&store, RecordingExecutor::ok(serde_json::json!({})), 3)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report, WorkerReport::default());
        assert_eq!(reload(&store, &settled).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unsettled_job_is_released_to_queue() {
        let store = memory_store();
        store.save_workflow(&workflow(WorkflowOrigin::Platform)).unwrap();
        store.save_environment(&environment(None)).unwrap();
        let job = queued_job(&store);
        let worker = worker_over(
            FlakySettleStore::new(&store, 1),
            &store,
            RecordingExecutor::ok(serde_json::json!({})),
            worker_config(3, 300),
        );

        assert_eq!(worker.run_once().await.unwrap().total(), 0);
        assert_eq!(reload(&store, &job).await.status, JobStatus::Queued);

        assert_eq!(worker.run_once().await.unwrap().completed, 1);
        let settled = reload(&store, &job).await;
        assert_eq!(settled.status, JobStatus::Completed);
        assert_eq!(settled.attempts, 2);
    }

    #[tokio::test]
    async fn test_stale_running_job_is_reclaimed() {
        let store = memory_store();
        store.save_workflow(&workflow(WorkflowOrigin::Platform)).unwrap();
        store.save_environment(&environment(None)).unwrap();
        let job = queued_job(&store);
        let worker = worker_over(
            FlakySettleStore::new(&store, 2),
            &store,
            RecordingExecutor::ok(serde_json::json!({})),
            worker_config(3, 0),
        );

        worker.run_once().await.unwrap();
        assert_eq!(reload(&store, &job).await.status, JobStatus::Running);

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(reload(&store, &job).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_fresh_running_job_is_left_alone() {
        let store = memory_store();
        let mut job = job_with_parent(StepKind::Custom, "custom-step", None);
        job.status = JobStatus::Running;
        store.save_job(&job).unwrap();

        let report = worker(&store, RecordingExecutor::ok(serde_json::json!({})), 3)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.reclaimed, 0);
        assert_eq!(reload(&store, &job).await.status, JobStatus::Running);
    }
}
