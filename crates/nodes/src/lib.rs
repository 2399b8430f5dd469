//! `nodes` crate — the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node — built-in and plugin alike — must implement [`ExecutableNode`].
//! The engine crate dispatches execution through this trait object.

pub mod error;
pub mod http;
pub mod mock;
pub mod subworkflow;
pub mod traits;

pub use error::{NodeError, NodeFailure};
pub use http::HttpNode;
pub use subworkflow::{SubWorkflowNode, WorkflowInvoker};
pub use traits::{ExecutableNode, ExecutionContext};

#[cfg(test)]
mod tests;
