//! Step output mapping: turns a finished job's persisted side effects into
//! the output later steps see for it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use notiflow_core::error::Result;
use notiflow_core::traits::{JobStore, MessageStore};
use notiflow_core::types::{Job, StepKind};

pub struct StepOutputMapper {
    jobs: Arc<dyn JobStore>,
    messages: Arc<dyn MessageStore>,
}

impl StepOutputMapper {
    pub fn new(jobs: Arc<dyn JobStore>, messages: Arc<dyn MessageStore>) -> Self {
        Self { jobs, messages }
    }

    pub async fn map_output(&self, job: &Job) -> Result<Value> {
        self.map_output_at(job, Utc::now()).await
    }

    /// Same as [`map_output`](Self::map_output) with an explicit clock for
    /// delay durations.
    pub async fn map_output_at(&self, job: &Job, now: DateTime<Utc>) -> Result<Value> {
        match job.kind {
            StepKind::Delay => Ok(delay_output(job, now)),
            StepKind::Digest => self.digest_output(job).await,
            StepKind::InApp => self.in_app_output(job).await,
            StepKind::Custom => Ok(job.step_output.clone().unwrap_or_else(empty_object)),
            // TODO: confirm with product whether unmapped kinds should be rejected instead of
            // reported as `{}`.
            StepKind::Trigger
            | StepKind::Email
            | StepKind::Sms
            | StepKind::Chat
            | StepKind::Push
            | StepKind::Throttle
            | StepKind::Unknown => Ok(empty_object()),
        }
    }

    /// Events of the digest job and every job merged into it, oldest first.
    async fn digest_output(&self, job: &Job) -> Result<Value> {
        let merged = self
            .jobs
            .find_merged_jobs(&job.environment_id, &job.id)
            .await?;

        let mut seen = HashSet::new();
        let mut events: Vec<&Job> = merged
            .iter()
            .chain(std::iter::once(job))
            .filter(|j| seen.insert(j.id.clone()))
            .collect();
        // Stable sort: jobs created in the same instant keep store order.
        events.sort_by_key(|j| j.created_at);

        let events: Vec<Value> = events
            .into_iter()
            .map(|j| {
                json!({
                    "id": j.id,
                    "time": j.created_at,
                    "payload": j.payload,
                })
            })
            .collect();

        Ok(json!({
            "eventCount": events.len(),
            "events": events,
        }))
    }

    async fn in_app_output(&self, job: &Job) -> Result<Value> {
        let message = self
            .messages
            .find_message_for_job(&job.environment_id, &job.subscriber_id, &job.id)
            .await?;

        Ok(match message {
            Some(message) => json!({
                "seen": message.seen,
                "read": message.read,
                "lastSeenDate": message.last_seen_date,
                "lastReadDate": message.last_read_date,
            }),
            // Canceled before a message was created; later steps still
            // expect the full shape.
            None => json!({
                "seen": false,
                "read": false,
                "lastSeenDate": null,
                "lastReadDate": null,
            }),
        })
    }
}

/// How long the delay actually took, which may exceed the configured delay
/// under queue backpressure.
fn delay_output(job: &Job, now: DateTime<Utc>) -> Value {
    let elapsed = (now - job.created_at).num_milliseconds().max(0);
    json!({ "duration": elapsed })
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
