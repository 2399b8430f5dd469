//! `HttpNode` — executes a fully-rendered HTTP request.
//!
//! By the time a task reaches this node, `engine::template` has already
//! resolved every `{{input...}}` / `{{tasks.ID.output...}}` reference in the
//! task's `HttpRequestSpec`; `input` here is the rendered, concrete request
//! description: `{ "method", "url", "headers", "body" }`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::{NodeError, NodeFailure};
use crate::traits::{ExecutableNode, ExecutionContext};

/// A rendered HTTP request ready to be dispatched.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RenderedHttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// `ExecutableNode` implementation that performs the HTTP call for a
/// `TaskResource::Http` leaf.
pub struct HttpNode {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNode {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl ExecutableNode for HttpNode {
    #[instrument(skip(self, input, ctx), fields(task_id = %ctx.task_id))]
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let request: RenderedHttpRequest = serde_json::from_value(input).map_err(|e| {
            NodeError::fatal(format!("rendered request malformed: {e}"))
        })?;

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| NodeError::fatal(format!("invalid HTTP method '{}'", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(self.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let failure = NodeFailure::new(format!("transport error calling '{}': {e}", request.url))
                .with_url(request.url.clone());
            NodeError::Retryable(failure)
        })?;

        let status = response.status();
        let url = response.url().to_string();

        if status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Ok(body);
        }

        let body_text = response.text().await.unwrap_or_default();
        let failure = NodeFailure::new(format!(
            "upstream '{}' returned HTTP {}",
            request.url, status
        ))
        .with_http_status(status.as_u16())
        .with_url(url)
        .with_response_body(&body_text);

        if status.is_server_error() {
            warn!("task '{}' upstream 5xx: {}", ctx.task_id, status);
            Err(NodeError::Retryable(failure))
        } else {
            Err(NodeError::Fatal(failure))
        }
    }
}
