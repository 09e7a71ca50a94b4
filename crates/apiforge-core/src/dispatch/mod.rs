//! Invocation dispatch: deliver a JSON payload to an agent either by direct
//! function invocation or by a signed HTTP call, and normalize the response
//! into an [`InvocationResult`].
//!
//! Mode selection is a one-shot branch on [`InvocationMode`]; there is no
//! connection state. The network itself sits behind the [`Transport`] trait
//! so the mapping rules here can be exercised without AWS.

mod batch;
pub mod direct;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use crate::config::DEFAULT_MAX_CONCURRENT;
use crate::error::{ForgeError, ForgeResult};
use crate::metrics::METRICS;
use crate::obs;

/// How a request reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationMode {
    /// Synchronous function invocation by name or ARN.
    Direct,
    /// POST to an HTTPS endpoint signed with the ambient credentials.
    SignedHttp,
}

impl InvocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationMode::Direct => "direct",
            InvocationMode::SignedHttp => "signed-http",
        }
    }
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to one agent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub target: String,
    pub payload: Value,
    pub mode: InvocationMode,
}

impl InvocationRequest {
    pub fn new(target: impl Into<String>, payload: Value, mode: InvocationMode) -> Self {
        Self {
            target: target.into(),
            payload,
            mode,
        }
    }

    pub fn direct(function: impl Into<String>, payload: Value) -> Self {
        Self::new(function, payload, InvocationMode::Direct)
    }

    pub fn signed_http(url: impl Into<String>, payload: Value) -> Self {
        Self::new(url, payload, InvocationMode::SignedHttp)
    }

    /// Direct targets must be non-blank function identifiers; signed targets
    /// must be absolute http(s) URLs.
    pub fn validate(&self) -> ForgeResult<()> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(ForgeError::InvalidRequest(
                "invocation target must not be empty".to_string(),
            ));
        }
        match self.mode {
            InvocationMode::Direct => {
                if target.contains(char::is_whitespace) || target.contains("://") {
                    return Err(ForgeError::InvalidRequest(format!(
                        "not a function identifier: {target}"
                    )));
                }
            }
            InvocationMode::SignedHttp => {
                let url = reqwest::Url::parse(target)
                    .map_err(|e| ForgeError::InvalidRequest(format!("bad url {target}: {e}")))?;
                if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                    return Err(ForgeError::InvalidRequest(format!(
                        "signed-http target must be an absolute http(s) url: {target}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Normalized outcome of a single invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The caller may try again (timeouts, gateway timeouts).
    #[serde(default, skip_serializing_if = "is_false")]
    pub retryable: bool,
    /// Produced in place of a real result by a batch call.
    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl InvocationResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            retryable: false,
            fallback: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            retryable: false,
            fallback: false,
        }
    }

    /// The caller stopped waiting for `target` after `timeout`.
    pub fn timed_out(target: &str, timeout: Duration) -> Self {
        Self {
            retryable: true,
            ..Self::failed(format!(
                "invocation of {target} timed out after {}ms",
                timeout.as_millis()
            ))
        }
    }

    /// The gateway in front of `target` answered 504.
    pub fn gateway_timeout(target: &str) -> Self {
        Self {
            retryable: true,
            ..Self::failed(format!("gateway timed out waiting for {target}"))
        }
    }

    /// Per-item failure inside a batch.
    pub fn batch_failure(error: impl Into<String>) -> Self {
        Self {
            fallback: true,
            ..Self::failed(error)
        }
    }

    pub fn is_timeout(&self) -> bool {
        !self.success && self.retryable
    }
}

/// Raw response as seen by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Value of `X-Amz-Function-Error`, when the function itself failed.
    pub function_error: Option<String>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            function_error: None,
        }
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            function_error: None,
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network seam for the dispatcher.
///
/// Implementations return `Err` only for transport-level failures (network,
/// credentials, signing). Any HTTP status is returned as a [`RawResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke_function(&self, function: &str, payload: Vec<u8>) -> ForgeResult<RawResponse>;

    async fn post_signed(&self, url: &str, payload: Vec<u8>) -> ForgeResult<RawResponse>;
}

/// Routes requests to a [`Transport`] and maps raw responses.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    max_concurrent: usize,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Bound the number of in-flight requests in [`Dispatcher::invoke_parallel`].
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Deliver one request and wait for the full response.
    pub async fn invoke(&self, req: &InvocationRequest) -> ForgeResult<InvocationResult> {
        let span = obs::invocation_span(&req.target, req.mode.as_str());
        self.invoke_inner(req).instrument(span).await
    }

    async fn invoke_inner(&self, req: &InvocationRequest) -> ForgeResult<InvocationResult> {
        req.validate()?;
        let body = serde_json::to_vec(&req.payload)?;
        let started = Instant::now();

        METRICS.inc_invocations();
        obs::emit_invocation_started(&req.target, req.mode.as_str(), body.len());

        let outcome = match req.mode {
            InvocationMode::Direct => self
                .transport
                .invoke_function(&req.target, body)
                .await
                .and_then(|raw| map_direct_response(&req.target, raw)),
            InvocationMode::SignedHttp => self
                .transport
                .post_signed(&req.target, body)
                .await
                .and_then(|raw| map_signed_response(&req.target, raw)),
        };

        let success = matches!(&outcome, Ok(result) if result.success);
        if !success {
            METRICS.inc_invocation_failures();
        }
        obs::emit_invocation_finished(&req.target, started.elapsed().as_millis() as u64, success);
        outcome
    }

    /// [`Dispatcher::invoke`] bounded by `timeout`.
    ///
    /// When the timeout elapses the in-flight call is dropped, which cancels
    /// the underlying request, and a retryable timeout result is returned.
    pub async fn invoke_with_timeout(
        &self,
        req: &InvocationRequest,
        timeout: Duration,
    ) -> ForgeResult<InvocationResult> {
        match tokio::time::timeout(timeout, self.invoke(req)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                METRICS.inc_timeouts();
                obs::emit_invocation_timeout(&req.target, timeout.as_millis() as u64);
                Ok(InvocationResult::timed_out(&req.target, timeout))
            }
        }
    }
}

fn map_direct_response(target: &str, raw: RawResponse) -> ForgeResult<InvocationResult> {
    if raw.status == 404 {
        return Err(ForgeError::FunctionNotFound(target.to_string()));
    }
    check_status(&raw)?;
    Ok(direct::parse_direct_payload(
        &raw.body,
        raw.function_error.as_deref(),
    ))
}

fn map_signed_response(target: &str, raw: RawResponse) -> ForgeResult<InvocationResult> {
    if raw.status == 504 {
        return Ok(InvocationResult::gateway_timeout(target));
    }
    check_status(&raw)?;
    Ok(direct::parse_http_body(&raw.body))
}

fn check_status(raw: &RawResponse) -> ForgeResult<()> {
    if raw.status < 400 {
        return Ok(());
    }
    let body = raw.body_text();
    if raw.status == 403 && body.to_ascii_lowercase().contains("signature") {
        return Err(ForgeError::Signature(body));
    }
    Err(ForgeError::HttpStatus {
        status: raw.status,
        body,
    })
}
