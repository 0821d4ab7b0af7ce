//! Execution state: the replayed history of a run handed to the step
//! executor so user code can reference any prior step's result by id.

use notiflow_core::error::Result;
use notiflow_core::types::{ExecutionStateEntry, Job, StepState};

use crate::chain::JobChainReader;
use crate::outputs::StepOutputMapper;

pub struct ExecutionStateBuilder {
    chain: JobChainReader,
    outputs: StepOutputMapper,
}

impl ExecutionStateBuilder {
    pub fn new(chain: JobChainReader, outputs: StepOutputMapper) -> Self {
        Self { chain, outputs }
    }

    /// One entry per ancestor of `job`, oldest first.
    pub async fn build_state(&self, job: &Job) -> Result<Vec<ExecutionStateEntry>> {
        let mut ancestors = self.chain.read_chain(job).await?;
        ancestors.reverse();

        let mut state = Vec::with_capacity(ancestors.len());
        for ancestor in &ancestors {
            let outputs = self.outputs.map_output(ancestor).await?;
            state.push(ExecutionStateEntry {
                step_id: state_step_id(ancestor),
                outputs,
                state: StepState {
                    status: ancestor.status,
                    error: ancestor.error.clone(),
                },
            });
        }

        tracing::debug!("🧩 Built {} state entries for job {}", state.len(), job.id);
        Ok(state)
    }
}

fn state_step_id(job: &Job) -> String {
    job.step
        .resolved_step_id()
        .unwrap_or(job.step.id.as_str())
        .to_string()
}
