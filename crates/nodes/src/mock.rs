//! `MockNode` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail retryably `remaining` times, then succeed with `success`.
    FlakyThenSucceed {
        remaining: Arc<Mutex<u32>>,
        message: String,
        success: Value,
    },
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that fails retryably `failures` times, then succeeds.
    pub fn flaky_then_succeed(
        name: impl Into<String>,
        failures: u32,
        msg: impl Into<String>,
        success: Value,
    ) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FlakyThenSucceed {
                remaining: Arc::new(Mutex::new(failures)),
                message: msg.into(),
                success,
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.lock().unwrap().push(input.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(merge_named(&self.name, v)),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::fatal(msg.clone())),
            MockBehaviour::FlakyThenSucceed { remaining, message, success } => {
                let mut left = remaining.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    Err(NodeError::retryable(message.clone()))
                } else {
                    Ok(merge_named(&self.name, success))
                }
            }
        }
    }
}

/// Merge the incoming value with the node's own `node` tag so tests can
/// trace the data flowing through the pipeline.
fn merge_named(name: &str, v: &Value) -> Value {
    let mut out = json!({ "node": name });
    if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
        for (k, val) in v_obj {
            out_obj.insert(k.clone(), val.clone());
        }
    }
    out
}
