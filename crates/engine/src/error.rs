//! Engine-level error types and the exit-code taxonomy surfaced to callers.

use thiserror::Error;

use crate::model::CallStackError;

/// Errors raised while compiling a `WorkflowSpec` into an `ExecutionGraph`
/// (§4.2).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphBuildError {
    #[error("task '{from}' depends on undefined task '{to}'")]
    UndefinedDependency { from: String, to: String },

    #[error("workflow graph contains a cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("workflow has no tasks")]
    EmptyGraph,
}

/// Errors produced by the workflow engine end to end.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input validation failed: {0}")]
    InputValidation(String),

    #[error("graph build failed: {0}")]
    GraphBuild(#[from] GraphBuildError),

    #[error("template resolution failed for '{path}': {reason}")]
    TemplateResolution { path: String, reason: String },

    #[error("task '{task_id}' timed out after {elapsed_ms}ms")]
    TaskTimeout { task_id: String, elapsed_ms: u64 },

    #[error("sub-workflow cycle invoking '{workflow}': {}", path.join(" -> "))]
    SubworkflowCycle { workflow: String, path: Vec<String> },

    #[error("sub-workflow depth exceeded invoking '{workflow}' (max {max_depth})")]
    SubworkflowDepth { workflow: String, max_depth: usize },

    #[error("execution cancelled")]
    Cancelled,

    #[error("workflow '{0}' not found in catalog")]
    WorkflowNotFound(String),

    #[error("task resource '{0}' not found in catalog")]
    TaskNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CallStackError> for EngineError {
    fn from(err: CallStackError) -> Self {
        match err {
            CallStackError::Cycle { path } => EngineError::SubworkflowCycle {
                workflow: path.last().cloned().unwrap_or_default(),
                path,
            },
            CallStackError::MaxDepthExceeded { max_depth } => EngineError::SubworkflowDepth {
                workflow: String::new(),
                max_depth,
            },
        }
    }
}

/// The string exit codes callers see on the HTTP surface (§6.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    NotFound,
    InvalidInput,
    Timeout,
    Cancelled,
    CycleDetected,
    MaxDepthExceeded,
    UpstreamFailed,
    Internal,
}

impl ExitCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::NotFound => "NotFound",
            ExitCode::InvalidInput => "InvalidInput",
            ExitCode::Timeout => "Timeout",
            ExitCode::Cancelled => "Cancelled",
            ExitCode::CycleDetected => "CycleDetected",
            ExitCode::MaxDepthExceeded => "MaxDepthExceeded",
            ExitCode::UpstreamFailed => "UpstreamFailed",
            ExitCode::Internal => "Internal",
        }
    }
}

impl EngineError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            EngineError::InputValidation(_) => ExitCode::InvalidInput,
            EngineError::GraphBuild(GraphBuildError::CycleDetected { .. }) => ExitCode::CycleDetected,
            EngineError::GraphBuild(_) => ExitCode::InvalidInput,
            EngineError::TemplateResolution { .. } => ExitCode::InvalidInput,
            EngineError::TaskTimeout { .. } => ExitCode::Timeout,
            EngineError::SubworkflowCycle { .. } => ExitCode::CycleDetected,
            EngineError::SubworkflowDepth { .. } => ExitCode::MaxDepthExceeded,
            EngineError::Cancelled => ExitCode::Cancelled,
            EngineError::WorkflowNotFound(_) | EngineError::TaskNotFound(_) => ExitCode::NotFound,
            EngineError::Internal(_) => ExitCode::Internal,
        }
    }
}
