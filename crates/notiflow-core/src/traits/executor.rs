//! Execution collaborators: the request executor that talks to bridges and
//! the control-value sanitizer.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{BridgeFailure, BridgeRequest, ExecutionOutput, StepKind};

/// Called by a [`BridgeExecutor`] once per failed request, after its own
/// retries are exhausted and before it reports the error.
#[async_trait]
pub trait BridgeErrorHook: Send + Sync {
    async fn on_error(&self, failure: &BridgeFailure);
}

/// Sends an assembled execution request to the internal executor or an
/// external bridge.
#[async_trait]
pub trait BridgeExecutor: Send + Sync {
    async fn execute(
        &self,
        request: BridgeRequest,
        on_error: &dyn BridgeErrorHook,
    ) -> Result<ExecutionOutput>;
}

/// Cleans control values authored in the platform editor before they cross
/// the trust boundary.
pub trait ControlSanitizer: Send + Sync {
    fn sanitize(&self, controls: Value, kind: StepKind) -> Value;
}
