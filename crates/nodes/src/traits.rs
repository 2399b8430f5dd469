//! The `ExecutableNode` trait — the contract every task leaf must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: uuid::Uuid,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// ID of the task step currently being dispatched.
    pub task_id: String,
    /// Already-template-resolved input for this task. By the time a node
    /// sees this, every `{{input...}}` / `{{tasks.ID.output...}}` reference
    /// has been substituted by the orchestrator's template resolver.
    pub input: Value,
    /// Decrypted secrets scoped to this workflow.
    pub secrets: std::collections::HashMap<String, String>,
}

/// The core node trait.
///
/// All built-in nodes (HTTP call, sub-workflow recursion) and future plugins
/// must implement this. The engine dispatches every task leaf through this
/// trait object.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node against its resolved `input`, returning the JSON
    /// output that becomes `tasks.<id>.output` for downstream steps.
    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}
