//! Execution audit recorder: best-effort writer of execution details.
//!
//! A failing audit sink is logged and swallowed: notification delivery must
//! not stall because the activity feed is unavailable.

use std::sync::Arc;

use notiflow_core::traits::ExecutionDetailSink;
use notiflow_core::types::{ExecutionDetail, NewExecutionDetail};

#[derive(Clone)]
pub struct ExecutionAuditRecorder {
    sink: Arc<dyn ExecutionDetailSink>,
}

impl ExecutionAuditRecorder {
    pub fn new(sink: Arc<dyn ExecutionDetailSink>) -> Self {
        Self { sink }
    }

    /// Append one detail. Returns `false` when the sink rejected it.
    pub async fn record(&self, detail: NewExecutionDetail) -> bool {
        let detail = ExecutionDetail::create(detail);
        match self.sink.append(&detail).await {
            Ok(()) => {
                tracing::debug!(
                    "📝 Execution detail {:?}/{:?} recorded for job {}",
                    detail.detail,
                    detail.status,
                    detail.context.job_id
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Failed to record execution detail {:?} for job {}: {}",
                    detail.detail,
                    detail.context.job_id,
                    e
                );
                false
            }
        }
    }
}
