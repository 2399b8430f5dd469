//! `SubWorkflowNode` — recurses into another workflow via a caller-supplied
//! invoker, so that `nodes` never depends on `engine` directly (the
//! `Orchestrator` implements `WorkflowInvoker` and is injected here).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::traits::{ExecutableNode, ExecutionContext};

/// Callback the `nodes` crate uses to recurse into a sub-workflow without
/// depending on `engine::Orchestrator` directly.
#[async_trait]
pub trait WorkflowInvoker: Send + Sync {
    /// Execute `workflow_ref` with `input`, propagating the caller's call
    /// stack (cloned by the implementor) for cycle/depth detection.
    async fn invoke(
        &self,
        workflow_ref: &str,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}

pub struct SubWorkflowNode {
    pub workflow_ref: String,
    pub invoker: std::sync::Arc<dyn WorkflowInvoker>,
}

impl SubWorkflowNode {
    pub fn new(workflow_ref: impl Into<String>, invoker: std::sync::Arc<dyn WorkflowInvoker>) -> Self {
        Self {
            workflow_ref: workflow_ref.into(),
            invoker,
        }
    }
}

#[async_trait]
impl ExecutableNode for SubWorkflowNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.invoker.invoke(&self.workflow_ref, input, ctx).await
    }
}
