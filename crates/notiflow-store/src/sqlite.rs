//! SQLite-backed implementation of the Notiflow store traits.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::{
    ControlValuesStore, EnvironmentStore, ExecutionDetailSink, JobStore, MessageStore,
    WorkflowStore,
};
use notiflow_core::types::{
    ControlValues, ControlValuesLevel, Environment, ExecutionDetail, InAppMessage, Job, JobStatus,
    Workflow, WorkflowType,
};

/// SQLite-backed store for jobs, workflows, environments, control values,
/// in-app messages and execution details.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| NotiflowError::store(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| NotiflowError::store(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                environment_id TEXT NOT NULL,
                parent_id TEXT,
                merged_digest_id TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                data TEXT NOT NULL              -- full Job as JSON
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_env ON jobs(environment_id, id);
            CREATE INDEX IF NOT EXISTS idx_jobs_digest ON jobs(environment_id, merged_digest_id, status);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at);

            CREATE TABLE IF NOT EXISTS environments (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                environment_id TEXT NOT NULL,
                kind TEXT NOT NULL,             -- 'regular', 'bridge'
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS control_values (
                id TEXT PRIMARY KEY,
                environment_id TEXT NOT NULL,
                workflow_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                level TEXT NOT NULL,            -- 'step_controls', 'layout_controls'
                updated_at TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_controls_step
                ON control_values(environment_id, workflow_id, step_id, level);

            CREATE TABLE IF NOT EXISTS in_app_messages (
                id TEXT PRIMARY KEY,
                environment_id TEXT NOT NULL,
                subscriber_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_job
                ON in_app_messages(environment_id, subscriber_id, job_id);

            -- Append-only audit trail
            CREATE TABLE IF NOT EXISTS execution_details (
                id TEXT PRIMARY KEY,
                environment_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_details_job
                ON execution_details(environment_id, job_id, created_at);
         ",
            )
            .map_err(|e| NotiflowError::store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NotiflowError::store("DB connection lock poisoned"))
    }

    fn fetch_one<T: DeserializeOwned, P: Params>(&self, sql: &str, params: P) -> Result<Option<T>> {
        let data: Option<String> = self
            .conn()?
            .query_row(sql, params, |row| row.get(0))
            .optional()
            .map_err(|e| NotiflowError::store(format!("Query: {e}")))?;
        data.map(|d| serde_json::from_str(&d)).transpose().map_err(Into::into)
    }

    fn fetch_all<T: DeserializeOwned, P: Params>(&self, sql: &str, params: P) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| NotiflowError::store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(|e| NotiflowError::store(format!("Query: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let data = row.map_err(|e| NotiflowError::store(format!("Row: {e}")))?;
            out.push(serde_json::from_str(&data)?);
        }
        Ok(out)
    }

    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn()?
            .execute(sql, params)
            .map_err(|e| NotiflowError::store(format!("Execute: {e}")))
    }

    // ─── Writers ──────────────────────────────────────

    /// Insert or replace a job.
    pub fn save_job(&self, job: &Job) -> Result<()> {
        self.execute(
            "INSERT OR REPLACE INTO jobs
             (id, environment_id, parent_id, merged_digest_id, status, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                job.id,
                job.environment_id,
                job.parent_id,
                job.merged_digest_id,
                job.status.as_str(),
                timestamp(&job.created_at),
                to_json(job)?,
            ],
        )?;
        Ok(())
    }

    pub fn save_environment(&self, environment: &Environment) -> Result<()> {
        self.execute(
            "INSERT OR REPLACE INTO environments (id, data) VALUES (?1, ?2)",
            rusqlite::params![environment.id, to_json(environment)?],
        )?;
        Ok(())
    }

    pub fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.execute(
            "INSERT OR REPLACE INTO workflows (id, environment_id, kind, data) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                workflow.id,
                workflow.environment_id,
                workflow.kind.as_str(),
                to_json(workflow)?,
            ],
        )?;
        Ok(())
    }

    pub fn save_control_values(&self, values: &ControlValues) -> Result<()> {
        self.execute(
            "INSERT OR REPLACE INTO control_values
             (id, environment_id, workflow_id, step_id, level, updated_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                values.id,
                values.environment_id,
                values.workflow_id,
                values.step_id,
                values.level.as_str(),
                timestamp(&values.updated_at),
                to_json(values)?,
            ],
        )?;
        Ok(())
    }

    pub fn save_message(&self, message: &InAppMessage) -> Result<()> {
        self.execute(
            "INSERT OR REPLACE INTO in_app_messages (id, environment_id, subscriber_id, job_id, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                message.id,
                message.environment_id,
                message.subscriber_id,
                message.job_id,
                to_json(message)?,
            ],
        )?;
        Ok(())
    }

    /// Load-modify-store a job scoped to its environment.
    fn modify_job<F>(&self, environment_id: &str, job_id: &str, f: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut job: Job = self
            .fetch_one(
                "SELECT data FROM jobs WHERE environment_id = ?1 AND id = ?2",
                rusqlite::params![environment_id, job_id],
            )?
            .ok_or_else(|| NotiflowError::store(format!("Job {job_id} not found in {environment_id}")))?;
        f(&mut job);
        job.updated_at = Utc::now();
        self.save_job(&job)?;
        Ok(job)
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn find_job(&self, environment_id: &str, job_id: &str) -> Result<Option<Job>> {
        self.fetch_one(
            "SELECT data FROM jobs WHERE environment_id = ?1 AND id = ?2",
            rusqlite::params![environment_id, job_id],
        )
    }

    async fn find_merged_jobs(&self, environment_id: &str, digest_job_id: &str) -> Result<Vec<Job>> {
        self.fetch_all(
            "SELECT data FROM jobs
             WHERE environment_id = ?1 AND merged_digest_id = ?2 AND status = ?3
             ORDER BY created_at",
            rusqlite::params![environment_id, digest_job_id, JobStatus::Merged.as_str()],
        )
    }

    async fn list_jobs_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        self.fetch_all(
            "SELECT data FROM jobs WHERE status = ?1 ORDER BY created_at LIMIT ?2",
            rusqlite::params![status.as_str(), limit as i64],
        )
    }

    async fn update_status(
        &self,
        environment_id: &str,
        job_id: &str,
        status: JobStatus,
        error: Option<Value>,
    ) -> Result<()> {
        self.modify_job(environment_id, job_id, |job| {
            job.status = status;
            job.error = error;
        })?;
        tracing::debug!("💾 Job {} → {}", job_id, status);
        Ok(())
    }

    async fn increment_attempts(&self, environment_id: &str, job_id: &str) -> Result<u32> {
        let job = self.modify_job(environment_id, job_id, |job| {
            job.attempts = job.attempts.saturating_add(1);
        })?;
        Ok(job.attempts)
    }
}

#[async_trait]
impl EnvironmentStore for SqliteStore {
    async fn find_environment(&self, environment_id: &str) -> Result<Option<Environment>> {
        self.fetch_one(
            "SELECT data FROM environments WHERE id = ?1",
            rusqlite::params![environment_id],
        )
    }
}

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn find_workflow(
        &self,
        environment_id: &str,
        workflow_id: &str,
        types: &[WorkflowType],
    ) -> Result<Option<Workflow>> {
        if types.is_empty() {
            return Ok(None);
        }
        let placeholders = (0..types.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT data FROM workflows WHERE environment_id = ?1 AND id = ?2 AND kind IN ({placeholders})"
        );
        let mut params: Vec<&str> = vec![environment_id, workflow_id];
        params.extend(types.iter().map(|t| t.as_str()));
        self.fetch_one(&sql, rusqlite::params_from_iter(params))
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn find_message_for_job(
        &self,
        environment_id: &str,
        subscriber_id: &str,
        job_id: &str,
    ) -> Result<Option<InAppMessage>> {
        self.fetch_one(
            "SELECT data FROM in_app_messages
             WHERE environment_id = ?1 AND subscriber_id = ?2 AND job_id = ?3",
            rusqlite::params![environment_id, subscriber_id, job_id],
        )
    }
}

#[async_trait]
impl ControlValuesStore for SqliteStore {
    async fn find_control_values(
        &self,
        environment_id: &str,
        workflow_id: &str,
        step_id: &str,
        level: ControlValuesLevel,
    ) -> Result<Option<ControlValues>> {
        self.fetch_one(
            "SELECT data FROM control_values
             WHERE environment_id = ?1 AND workflow_id = ?2 AND step_id = ?3 AND level = ?4
             ORDER BY updated_at DESC LIMIT 1",
            rusqlite::params![environment_id, workflow_id, step_id, level.as_str()],
        )
    }
}

#[async_trait]
impl ExecutionDetailSink for SqliteStore {
    async fn append(&self, detail: &ExecutionDetail) -> Result<()> {
        self.execute(
            "INSERT INTO execution_details (id, environment_id, job_id, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                detail.id,
                detail.context.environment_id,
                detail.context.job_id,
                timestamp(&detail.created_at),
                to_json(detail)?,
            ],
        )?;
        Ok(())
    }

    async fn list_for_job(&self, environment_id: &str, job_id: &str) -> Result<Vec<ExecutionDetail>> {
        self.fetch_all(
            "SELECT data FROM execution_details
             WHERE environment_id = ?1 AND job_id = ?2 ORDER BY created_at, rowid",
            rusqlite::params![environment_id, job_id],
        )
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
