//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and its
//! execution history look like in memory. They serialize to/from the
//! JSON columns the `db` crate persists, but the algorithms in this crate
//! (graph building, validation, templating, stats) operate on them — or on
//! `value::Value` — directly rather than on raw JSON.

pub mod baseline;
pub mod callstack;
pub mod execution;
pub mod value;
pub mod workflow;

pub use baseline::{AnomalyEvent, Baseline, BaselineScope, Severity};
pub use callstack::{CallStackError, WorkflowCallStack};
pub use execution::{
    ErrorDetail, ErrorKind, ExecutionRecord, ExecutionStatus, OrchestrationCost,
    TaskExecutionRecord, TaskExecutionStatus, DurationTrendPoint,
};
pub use value::Value;
pub use workflow::{
    BackoffKind, HttpRequestSpec, InputParam, ParamType, RetryPolicy, ScheduleTrigger, TaskResource,
    TaskStep, Trigger, WebhookTrigger, WorkflowSpec,
};
