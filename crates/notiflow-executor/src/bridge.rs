//! HTTP bridge executor: POSTs signed execute requests to the platform's
//! internal executor or to a customer-hosted bridge endpoint.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde_json::Value;
use sha2::Sha256;

use notiflow_core::config::BridgeConfig;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::{BridgeErrorHook, BridgeExecutor};
use notiflow_core::types::{BridgeErrorCode, BridgeFailure, BridgeRequest, ExecutionOutput};

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-notiflow-signature";

/// Statuses worth another attempt.
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504, 521, 522, 524];

type HmacSha256 = Hmac<Sha256>;

pub struct HttpBridgeExecutor {
    client: reqwest::Client,
    config: BridgeConfig,
}

/// One failed HTTP attempt.
struct AttemptError {
    failure: BridgeFailure,
    retryable: bool,
}

impl HttpBridgeExecutor {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Endpoint for `request`: the job's ad-hoc URL, the customer's bridge for
    /// external workflows, or the internal executor.
    fn target_url(&self, request: &BridgeRequest) -> Result<String> {
        if let Some(url) = request.target_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        if request.targets_internal_executor() {
            return Ok(format!(
                "{}/{}/bridge",
                self.config.internal_base_url.trim_end_matches('/'),
                request.environment_id
            ));
        }
        request
            .bridge_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| NotiflowError::BridgeUrlMissing {
                environment_id: request.environment_id.clone(),
                workflow_id: request.routing.workflow_id.clone(),
            })
    }

    /// Resolve the endpoint and serialize the body once for every attempt.
    fn prepare(&self, request: &BridgeRequest) -> Result<(String, String)> {
        let url = self.target_url(request)?;
        let body = serde_json::to_string(&request.event)?;
        Ok((url, body))
    }

    async fn send_once(
        &self,
        url: &str,
        request: &BridgeRequest,
        body: &str,
        api_key: &str,
    ) -> std::result::Result<ExecutionOutput, AttemptError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let signature = sign(api_key, timestamp, body).map_err(|e| AttemptError {
            failure: BridgeFailure::new(url, BridgeErrorCode::ExecutionFailed, e.to_string()),
            retryable: false,
        })?;

        let routing = &request.routing;
        let resp = self
            .client
            .post(url)
            .query(&[
                ("action", request.action.as_str()),
                ("workflowId", routing.workflow_id.as_str()),
                ("stepId", routing.step_id.as_str()),
                ("jobId", routing.job_id.as_str()),
            ])
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_string())
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error(url, e))?;

        if status.is_success() {
            serde_json::from_str::<ExecutionOutput>(&text).map_err(|e| AttemptError {
                failure: BridgeFailure::new(
                    url,
                    BridgeErrorCode::InvalidResponse,
                    format!("Bridge returned an unparseable body: {e}"),
                )
                .with_status(status.as_u16()),
                retryable: false,
            })
        } else {
            Err(status_error(url, status, &text))
        }
    }
}

#[async_trait]
impl BridgeExecutor for HttpBridgeExecutor {
    async fn execute(
        &self,
        request: BridgeRequest,
        on_error: &dyn BridgeErrorHook,
    ) -> Result<ExecutionOutput> {
        let (url, body) = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Bridge request for step '{}' could not be prepared: {}",
                    request.routing.step_id,
                    e
                );
                let failure = BridgeFailure::new(
                    request.target_url.as_deref().unwrap_or_default(),
                    BridgeErrorCode::ExecutionFailed,
                    e.to_string(),
                );
                on_error.on_error(&failure).await;
                return Err(e);
            }
        };

        let mut attempt = 0u32;
        loop {
            match self.send_once(&url, &request, &body, &request.signing_key).await {
                Ok(output) => {
                    tracing::debug!(
                        "🌉 Bridge {} answered step '{}' after {} attempt(s)",
                        url,
                        request.routing.step_id,
                        attempt + 1
                    );
                    return Ok(output);
                }
                Err(err) if err.retryable && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay(attempt);
                    tracing::warn!(
                        "🔁 Bridge call to {} failed ({}), retrying in {:?}",
                        url,
                        err.failure.message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    on_error.on_error(&err.failure).await;
                    return Err(NotiflowError::Bridge(err.failure));
                }
            }
        }
    }
}

/// `t={timestamp},v1={hex hmac-sha256 of "{timestamp}.{body}"}`.
pub fn sign(api_key: &str, timestamp_ms: i64, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(api_key.as_bytes())
        .map_err(|e| NotiflowError::Other(format!("Invalid signing key: {e}")))?;
    mac.update(format!("{timestamp_ms}.{body}").as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp_ms},v1={digest}"))
}

fn transport_error(url: &str, e: reqwest::Error) -> AttemptError {
    let (code, retryable) = if e.is_timeout() {
        (BridgeErrorCode::RequestTimeout, true)
    } else if e.is_connect() {
        (BridgeErrorCode::EndpointUnavailable, true)
    } else {
        (BridgeErrorCode::ExecutionFailed, false)
    };
    let message = match code {
        BridgeErrorCode::RequestTimeout => "Bridge request timed out".to_string(),
        BridgeErrorCode::EndpointUnavailable => "Bridge endpoint is unreachable".to_string(),
        _ => "Bridge request failed".to_string(),
    };
    let mut failure = BridgeFailure::new(url, code, message).with_cause(e.to_string());
    if let Some(status) = e.status() {
        failure = failure.with_status(status.as_u16());
    }
    AttemptError { failure, retryable }
}

fn status_error(url: &str, status: StatusCode, text: &str) -> AttemptError {
    let code = match status.as_u16() {
        404 => BridgeErrorCode::EndpointNotFound,
        502 | 503 => BridgeErrorCode::EndpointUnavailable,
        _ => BridgeErrorCode::ExecutionFailed,
    };
    let data: Option<Value> = serde_json::from_str(text).ok();
    let message = data
        .as_ref()
        .and_then(|d| d.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "Bridge responded with {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });

    let mut failure = BridgeFailure::new(url, code, message).with_status(status.as_u16());
    if let Some(data) = data {
        failure = failure.with_data(data);
    }
    AttemptError {
        failure,
        retryable: RETRYABLE_STATUSES.contains(&status.as_u16()),
    }
}
