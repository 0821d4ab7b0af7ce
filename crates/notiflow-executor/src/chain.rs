//! Job chain reader: walks `parent_id` pointers back to the first job of a
//! workflow run.
//!
//! Each run is linear, so the chain is a linked list stored as point lookups.
//! Every hop needs the previous job's parent pointer, so lookups are awaited
//! one after another.

use std::sync::Arc;

use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::JobStore;
use notiflow_core::types::Job;

pub struct JobChainReader {
    jobs: Arc<dyn JobStore>,
    max_depth: usize,
}

impl JobChainReader {
    pub fn new(jobs: Arc<dyn JobStore>, max_depth: usize) -> Self {
        Self { jobs, max_depth }
    }

    /// Ancestors of `job`, nearest parent first. A root job yields an empty list.
    ///
    /// A parent that cannot be found ends the walk: retention may have pruned
    /// older jobs. Store errors propagate. Walking more than `max_depth`
    /// ancestors means the chain has a cycle, which is reported as
    /// [`NotiflowError::ChainTooDeep`].
    pub async fn read_chain(&self, job: &Job) -> Result<Vec<Job>> {
        let mut chain: Vec<Job> = Vec::new();
        let mut next_parent = job.parent_id.clone();

        while let Some(parent_id) = next_parent {
            if chain.len() >= self.max_depth {
                tracing::error!(
                    "🔁 Job chain for {} exceeds {} ancestors, possible parent cycle",
                    job.id,
                    self.max_depth
                );
                return Err(NotiflowError::ChainTooDeep {
                    job_id: job.id.clone(),
                    max_depth: self.max_depth,
                });
            }

            match self.jobs.find_job(&job.environment_id, &parent_id).await? {
                Some(parent) => {
                    next_parent = parent.parent_id.clone();
                    chain.push(parent);
                }
                None => {
                    tracing::debug!(
                        "Parent {} of job chain {} not found, treating as root",
                        parent_id,
                        job.id
                    );
                    next_parent = None;
                }
            }
        }

        Ok(chain)
    }
}
