//! Unit tests for node-level error shaping and the built-in test doubles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::error::{NodeError, NodeFailure};
use crate::mock::MockNode;
use crate::subworkflow::{SubWorkflowNode, WorkflowInvoker};
use crate::traits::{ExecutableNode, ExecutionContext};

fn ctx() -> ExecutionContext {
    ExecutionContext {
        workflow_id: Uuid::new_v4(),
        execution_id: Uuid::new_v4(),
        task_id: "t1".into(),
        input: json!({}),
        secrets: HashMap::new(),
    }
}

#[test]
fn response_body_preview_is_truncated_to_1kib() {
    let body = "x".repeat(2048);
    let failure = NodeFailure::new("boom").with_response_body(&body);
    let preview = failure.response_body_preview.unwrap();
    assert!(preview.len() <= 1024 + 3);
    assert!(preview.ends_with("..."));
}

#[test]
fn response_body_preview_truncation_does_not_split_a_multibyte_char() {
    // 1023 ASCII bytes followed by a 3-byte '€' straddles the byte-1024
    // truncation point, which is not a char boundary.
    let mut body = "x".repeat(1023);
    body.push('€');
    body.push_str(&"y".repeat(100));

    let failure = NodeFailure::new("boom").with_response_body(&body);
    let preview = failure.response_body_preview.unwrap();
    assert!(preview.ends_with("..."));
    assert!(preview.is_char_boundary(preview.len() - 3));
}

#[test]
fn short_response_body_is_not_truncated() {
    let failure = NodeFailure::new("boom").with_response_body("short body");
    assert_eq!(failure.response_body_preview.unwrap(), "short body");
}

#[tokio::test]
async fn mock_node_flaky_then_succeed_exhausts_failures_before_success() {
    let node = MockNode::flaky_then_succeed("flaky", 2, "try again", json!({ "ok": true }));
    let c = ctx();

    let first = node.execute(json!({}), &c).await;
    assert!(matches!(first, Err(NodeError::Retryable(_))));

    let second = node.execute(json!({}), &c).await;
    assert!(matches!(second, Err(NodeError::Retryable(_))));

    let third = node.execute(json!({}), &c).await.expect("should succeed now");
    assert_eq!(third["ok"], true);
    assert_eq!(node.call_count(), 3);
}

struct EchoInvoker;

#[async_trait]
impl WorkflowInvoker for EchoInvoker {
    async fn invoke(
        &self,
        workflow_ref: &str,
        input: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, NodeError> {
        Ok(json!({ "invoked": workflow_ref, "input": input }))
    }
}

#[tokio::test]
async fn subworkflow_node_delegates_to_invoker() {
    let node = SubWorkflowNode::new("child-workflow", Arc::new(EchoInvoker));
    let out = node.execute(json!({ "x": 1 }), &ctx()).await.expect("ok");
    assert_eq!(out["invoked"], "child-workflow");
    assert_eq!(out["input"]["x"], 1);
}
