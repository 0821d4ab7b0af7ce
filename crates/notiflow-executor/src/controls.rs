//! Control value resolution for stateful jobs.

use std::sync::Arc;

use serde_json::Value;

use notiflow_core::error::Result;
use notiflow_core::traits::{ControlSanitizer, ControlValuesStore};
use notiflow_core::types::{ControlValuesLevel, Job, Workflow, WorkflowOrigin};

pub struct ControlValueResolver {
    store: Arc<dyn ControlValuesStore>,
    sanitizer: Arc<dyn ControlSanitizer>,
}

impl ControlValueResolver {
    pub fn new(store: Arc<dyn ControlValuesStore>, sanitizer: Arc<dyn ControlSanitizer>) -> Self {
        Self { store, sanitizer }
    }

    /// Step-level controls for `job`. Values from platform-authored workflows
    /// are sanitized; external workflows get them verbatim because the same
    /// author wrote both the values and the code reading them.
    pub async fn resolve(&self, job: &Job, workflow: &Workflow) -> Result<Value> {
        let controls = self
            .store
            .find_control_values(
                &job.environment_id,
                &workflow.id,
                &job.step.id,
                ControlValuesLevel::StepControls,
            )
            .await?
            .map(|values| values.controls)
            .unwrap_or_else(|| Value::Object(Default::default()));

        Ok(match workflow.origin {
            WorkflowOrigin::Platform => self.sanitizer.sanitize(controls, job.kind),
            WorkflowOrigin::External => controls,
        })
    }
}
