//! Node-level error type.

use std::fmt;

use thiserror::Error;

/// Structured detail carried by a node failure, rich enough for the engine
/// to build an `ErrorDetail` (truncated response preview, HTTP status,
/// upstream service name) without re-deriving it from a bare string.
#[derive(Debug, Clone, Default)]
pub struct NodeFailure {
    pub message: String,
    pub http_status: Option<u16>,
    pub service_name: Option<String>,
    pub url: Option<String>,
    /// Response body, truncated to 1 KiB by the producer.
    pub response_body_preview: Option<String>,
}

impl NodeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Truncate to 1 KiB per §7 `ErrorDetail.responseBodyPreview`. Walks
    /// back to the nearest char boundary so a multi-byte UTF-8 character
    /// straddling the limit doesn't panic.
    pub fn with_response_body(mut self, body: &str) -> Self {
        const LIMIT: usize = 1024;
        let preview = if body.len() > LIMIT {
            let mut end = LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body.to_string()
        };
        self.response_body_preview = Some(preview);
        self
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors returned by a node's `execute` method.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the task is re-attempted with exponential back-off.
/// - `Fatal`     — the execution is immediately marked as failed, no retry.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Transient failure; the caller should retry per the task's `RetryPolicy`.
    #[error("retryable node error: {0}")]
    Retryable(NodeFailure),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal node error: {0}")]
    Fatal(NodeFailure),
}

impl NodeError {
    pub fn retryable(message: impl Into<String>) -> Self {
        NodeError::Retryable(NodeFailure::new(message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        NodeError::Fatal(NodeFailure::new(message))
    }

    pub fn failure(&self) -> &NodeFailure {
        match self {
            NodeError::Retryable(f) | NodeError::Fatal(f) => f,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Retryable(_))
    }
}
