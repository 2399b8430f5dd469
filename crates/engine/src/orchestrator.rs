//! Orchestrator (C4, spec.md §4.4) — the engine's execution core.
//!
//! Drives one `WorkflowSpec` end to end: validates input, builds the DAG,
//! dispatches each level of `ExecutionGraph::parallel_groups` concurrently
//! via a `tokio::task::JoinSet`, retries/backs off failed tasks per their
//! `RetryPolicy`, propagates failure to transitive dependents as `Skipped`,
//! and records the whole run through `ExecutionRecorder`/`StatsAggregator`/
//! `AnomalyDetector`/`EventSink` — none of which the orchestrator knows how
//! to actually persist or transport, only that it's allowed to call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value as Json};
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use nodes::{ExecutableNode, ExecutionContext as NodeContext, HttpNode, NodeError, SubWorkflowNode, WorkflowInvoker};

use crate::anomaly::AnomalyDetector;
use crate::catalog::WorkflowCatalog;
use crate::error::EngineError;
use crate::events::EventSink;
use crate::graph::{self, ExecutionGraph};
use crate::model::{
    BackoffKind, BaselineScope, ErrorDetail, ErrorKind, ExecutionRecord, ExecutionStatus,
    OrchestrationCost, RetryPolicy, TaskExecutionRecord, TaskExecutionStatus, TaskResource, TaskStep,
    Value, WorkflowCallStack, WorkflowSpec,
};
use crate::recorder::ExecutionRecorder;
use crate::template::{self, TemplateContext};
use crate::validate::InputValidator;

/// Tunables the teacher hardcoded as constants; here they're constructor
/// knobs so the `cli` crate's `Config` can source them in one place (§9).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workflow_deadline: Duration,
    pub call_stack_max_depth: usize,
    pub default_http_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workflow_deadline: Duration::from_secs(30),
            call_stack_max_depth: 5,
            default_http_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ExecutionResult {
    pub record: ExecutionRecord,
    pub output: Json,
}

/// Outcome of running (and possibly retrying) a single task to completion.
enum TaskOutcome {
    Succeeded { record: TaskExecutionRecord, output: Json },
    Failed { record: TaskExecutionRecord },
    Cancelled { record: TaskExecutionRecord },
}

/// A single dispatch attempt's failure, before retry classification.
enum AttemptError {
    Timeout,
    Node(NodeError),
    /// A structural problem with the task itself — no catalog entry, a
    /// broken sub-workflow call stack, an unresolved template. Always
    /// non-retryable.
    Fatal(ErrorKind, String),
    Cancelled,
}

pub struct Orchestrator {
    catalog: Arc<dyn WorkflowCatalog>,
    recorder: Arc<dyn ExecutionRecorder>,
    events: Arc<dyn EventSink>,
    stats: crate::stats::StatsAggregator,
    anomaly: AnomalyDetector,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn WorkflowCatalog>,
        recorder: Arc<dyn ExecutionRecorder>,
        events: Arc<dyn EventSink>,
        stats: crate::stats::StatsAggregator,
        anomaly: AnomalyDetector,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self { catalog, recorder, events, stats, anomaly, config })
    }

    pub fn stats(&self) -> &crate::stats::StatsAggregator {
        &self.stats
    }

    pub fn anomaly(&self) -> &AnomalyDetector {
        &self.anomaly
    }

    /// Entry point for a fresh, top-level execution (§4.4 step 1: "push
    /// workflow.name onto a new CallStack").
    #[instrument(skip(self, input, cancel), fields(workflow = %workflow_name))]
    pub async fn execute(
        self: &Arc<Self>,
        workflow_name: &str,
        input: Json,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let stack = WorkflowCallStack::root(workflow_name, self.config.call_stack_max_depth);
        self.execute_with_stack(workflow_name, input, stack, cancel).await
    }

    /// Runs `workflow_name` under an already-validated `call_stack`. Used
    /// both by `execute` (fresh root stack) and by sub-workflow recursion
    /// (a stack that already had this name pushed onto it by the caller's
    /// dispatch, before this function is ever entered — §4.5).
    async fn execute_with_stack(
        self: &Arc<Self>,
        workflow_name: &str,
        input: Json,
        call_stack: WorkflowCallStack,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let spec = self
            .catalog
            .workflow(workflow_name)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_name.to_string()))?;

        let validation = InputValidator::validate(&spec, &input);
        if !validation.valid {
            return Err(EngineError::InputValidation(validation.suggested_prompt.unwrap_or_default()));
        }

        let graph_started = std::time::Instant::now();
        let (graph_exec, _diagnostics) = graph::build(&spec)?;
        let graph_build_duration = graph_started.elapsed();

        let execution_id = Uuid::new_v4();
        let mut record = ExecutionRecord::new(execution_id, workflow_name, input.clone());
        record.graph_build_duration = Some(graph_build_duration);

        self.events.workflow_started(execution_id, workflow_name).await;

        let workflow_deadline_at = TokioInstant::now() + self.config.workflow_deadline;
        let workflow_input: Value = input.clone().into();

        let mut task_outputs: HashMap<String, Value> = HashMap::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut cancelled = false;

        let mut cost = OrchestrationCost { graph_build: graph_build_duration, ..Default::default() };

        'levels: for level in graph_exec.parallel_groups() {
            if cancel.is_cancelled() {
                cancelled = true;
                for id in level {
                    skipped.insert(id.clone());
                }
                break 'levels;
            }

            let level_started = std::time::Instant::now();
            let mut ready = Vec::new();
            for id in level {
                let blocked = graph_exec
                    .predecessors(id)
                    .iter()
                    .any(|dep| failed.contains(dep) || skipped.contains(dep));
                if blocked {
                    skipped.insert(id.clone());
                    let now = chrono::Utc::now();
                    record.task_executions.push(TaskExecutionRecord {
                        execution_id,
                        task_id: id.clone(),
                        task_ref: graph_exec.node(id).map(|n| n.task_ref.clone()).unwrap_or_default(),
                        status: TaskExecutionStatus::Skipped,
                        output: None,
                        errors: vec!["skipped: an upstream dependency failed or was skipped".to_string()],
                        error_info: None,
                        duration: Duration::ZERO,
                        retry_count: 0,
                        started_at: now,
                        completed_at: now,
                    });
                    self.events.task_completed(execution_id, id, TaskExecutionStatus::Skipped, None).await;
                } else {
                    ready.push(id.clone());
                }
            }

            let mut longest_task = Duration::ZERO;
            let mut join_set = tokio::task::JoinSet::new();
            for id in &ready {
                let Some(step) = graph_exec.node(id).cloned() else { continue };
                let this = Arc::clone(self);
                let spec_clone = spec.clone();
                let outputs_snapshot = task_outputs.clone();
                let workflow_input_clone = workflow_input.clone();
                let call_stack_clone = call_stack.clone();
                let cancel_clone = cancel.clone();
                join_set.spawn(async move {
                    let outcome = this
                        .run_task(
                            &spec_clone,
                            &step,
                            execution_id,
                            &workflow_input_clone,
                            &outputs_snapshot,
                            &call_stack_clone,
                            workflow_deadline_at,
                            cancel_clone,
                        )
                        .await;
                    (step.id, outcome)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (id, outcome) = match joined {
                    Ok(pair) => pair,
                    Err(join_err) => {
                        warn!("task join error: {join_err}");
                        continue;
                    }
                };
                match outcome {
                    TaskOutcome::Succeeded { record: trec, output } => {
                        longest_task = longest_task.max(trec.duration);
                        task_outputs.insert(id.clone(), output.clone().into());
                        self.events.task_completed(execution_id, &id, TaskExecutionStatus::Succeeded, Some(&output)).await;
                        for dependent in graph_exec.dependents(&id) {
                            self.events.signal_flow(execution_id, &id, dependent).await;
                        }
                        self.stats.record(workflow_name, Some(&id), trec.duration.as_millis() as u64, true).await;
                        self.record_anomaly_if_any(BaselineScope::task(workflow_name, &id), execution_id, trec.duration.as_millis() as u64).await;
                        record.task_executions.push(trec);
                    }
                    TaskOutcome::Failed { record: trec } => {
                        longest_task = longest_task.max(trec.duration);
                        failed.insert(id.clone());
                        self.events.task_completed(execution_id, &id, TaskExecutionStatus::Failed, None).await;
                        self.stats.record(workflow_name, Some(&id), trec.duration.as_millis() as u64, false).await;
                        record.task_executions.push(trec);
                    }
                    TaskOutcome::Cancelled { record: trec } => {
                        longest_task = longest_task.max(trec.duration);
                        cancelled = true;
                        failed.insert(id.clone());
                        self.events.task_completed(execution_id, &id, TaskExecutionStatus::Failed, None).await;
                        record.task_executions.push(trec);
                    }
                }
            }

            let level_wall = level_started.elapsed();
            cost.level_durations.push(level_wall);
            cost.scheduling_overhead += level_wall.saturating_sub(longest_task);

            if cancelled {
                break 'levels;
            }
        }

        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else if !failed.is_empty() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };

        let teardown_started = std::time::Instant::now();
        record.finalize(status);
        record.orchestration_cost = Some(cost);

        if let Some(duration) = record.duration {
            let ms = duration.as_millis() as u64;
            self.stats.record(workflow_name, None, ms, status == ExecutionStatus::Succeeded).await;
            self.record_anomaly_if_any(BaselineScope::workflow(workflow_name), execution_id, ms).await;
        }

        self.events.workflow_completed(execution_id, workflow_name, status).await;

        if let Err(err) = self.recorder.save(&record).await {
            warn!("failed to persist execution record {execution_id}: {err}");
        }
        record.orchestration_cost.as_mut().map(|c| c.teardown = teardown_started.elapsed());

        let output = self.render_output(&spec, &workflow_input, &task_outputs);

        info!(status = ?status, "execution {execution_id} of '{workflow_name}' finished");
        Ok(ExecutionResult { record, output })
    }

    async fn record_anomaly_if_any(&self, scope: BaselineScope, execution_id: Uuid, duration_ms: u64) {
        if let Some(event) = self.anomaly.evaluate(scope, execution_id, duration_ms).await {
            self.events.anomaly_detected(&event).await;
        }
    }

    /// Renders `WorkflowSpec.output`'s string templates against the final
    /// execution state. Best-effort: a field whose template doesn't resolve
    /// (e.g. it references a task that was skipped) is simply omitted
    /// rather than failing the whole execution, since the execution's own
    /// pass/fail status is already fixed by this point.
    fn render_output(&self, spec: &WorkflowSpec, workflow_input: &Value, task_outputs: &HashMap<String, Value>) -> Json {
        let ctx = TemplateContext { input: workflow_input.clone(), task_outputs: task_outputs.clone() };
        let mut out = serde_json::Map::with_capacity(spec.output.len());
        for (key, expr) in &spec.output {
            match template::render(&Json::String(expr.clone()), &ctx) {
                Ok(value) => {
                    out.insert(key.clone(), value);
                }
                Err(err) => {
                    warn!("output field '{key}' did not resolve: {err}");
                }
            }
        }
        Json::Object(out)
    }

    /// Runs one task to completion, including retries, and returns the
    /// `TaskExecutionRecord` plus output (on success) to fold into the
    /// caller's bookkeeping.
    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        self: &Arc<Self>,
        spec: &WorkflowSpec,
        step: &TaskStep,
        execution_id: Uuid,
        workflow_input: &Value,
        task_outputs: &HashMap<String, Value>,
        call_stack: &WorkflowCallStack,
        workflow_deadline_at: TokioInstant,
        cancel: CancellationToken,
    ) -> TaskOutcome {
        let started_at = chrono::Utc::now();
        let started_instant = std::time::Instant::now();

        self.events.task_started(execution_id, &step.id).await;

        let resource = match self.catalog.task(&step.task_ref) {
            Some(resource) => resource,
            None => {
                return self.task_failed(
                    execution_id,
                    step,
                    ErrorKind::TemplateResolution,
                    format!("task resource '{}' not found in catalog", step.task_ref),
                    0,
                    started_at,
                    started_instant,
                );
            }
        };

        let workflow_ctx = TemplateContext { input: workflow_input.clone(), task_outputs: task_outputs.clone() };

        if let Some(condition) = &step.condition {
            match template::render(&Json::String(condition.clone()), &workflow_ctx) {
                Ok(value) if !is_truthy(&value) => {
                    return TaskOutcome::Failed {
                        record: self.skipped_record(step, execution_id, started_at, "condition evaluated to a falsy value"),
                    };
                }
                Ok(_) => {}
                Err(err) => {
                    return self.task_failed(
                        execution_id,
                        step,
                        ErrorKind::TemplateResolution,
                        format!("condition did not resolve: {err}"),
                        0,
                        started_at,
                        started_instant,
                    );
                }
            }
        }

        let task_input = match self.render_task_input(step, &workflow_ctx) {
            Ok(v) => v,
            Err(err) => {
                return self.task_failed(
                    execution_id,
                    step,
                    ErrorKind::TemplateResolution,
                    format!("task input did not resolve: {err}"),
                    0,
                    started_at,
                    started_instant,
                );
            }
        };

        let task_ctx = TemplateContext { input: Value::from(task_input.clone()), task_outputs: task_outputs.clone() };
        let retry_policy = step.retry.clone().unwrap_or_default();
        let task_timeout = self.task_timeout(step, &resource);

        let mut retry_count: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return TaskOutcome::Cancelled {
                    record: self.cancelled_record(step, execution_id, started_at, started_instant, retry_count),
                };
            }

            let attempt = self
                .dispatch_once(spec, step, &resource, &task_ctx, &task_input, execution_id, call_stack, &cancel, workflow_deadline_at, task_timeout)
                .await;

            match attempt {
                Ok(output) => {
                    let now = chrono::Utc::now();
                    return TaskOutcome::Succeeded {
                        record: TaskExecutionRecord {
                            execution_id,
                            task_id: step.id.clone(),
                            task_ref: step.task_ref.clone(),
                            status: TaskExecutionStatus::Succeeded,
                            output: Some(output.clone()),
                            errors: Vec::new(),
                            error_info: None,
                            duration: started_instant.elapsed(),
                            retry_count,
                            started_at,
                            completed_at: now,
                        },
                        output,
                    };
                }
                Err(AttemptError::Cancelled) => {
                    return TaskOutcome::Cancelled {
                        record: self.cancelled_record(step, execution_id, started_at, started_instant, retry_count),
                    };
                }
                Err(AttemptError::Timeout) => {
                    return self.task_failed(
                        execution_id,
                        step,
                        ErrorKind::TaskTimeout,
                        format!("task '{}' exceeded its timeout of {:?}", step.id, task_timeout),
                        retry_count,
                        started_at,
                        started_instant,
                    );
                }
                Err(AttemptError::Fatal(kind, message)) => {
                    return self.task_failed(execution_id, step, kind, message, retry_count, started_at, started_instant);
                }
                Err(AttemptError::Node(node_err)) => {
                    let retryable = is_retryable(&node_err, &retry_policy);
                    if retryable && retry_count + 1 < retry_policy.max_attempts {
                        retry_count += 1;
                        let delay = backoff_delay(&retry_policy, retry_count);
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                return TaskOutcome::Cancelled {
                                    record: self.cancelled_record(step, execution_id, started_at, started_instant, retry_count),
                                };
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                    let kind = if node_err.failure().http_status.is_some() { ErrorKind::HttpStatus } else { ErrorKind::TransportError };
                    let mut detail = error_detail_from_node(step, &node_err, retry_count, started_instant.elapsed());
                    detail.kind = kind;
                    let failed_record = TaskExecutionRecord {
                        execution_id,
                        task_id: step.id.clone(),
                        task_ref: step.task_ref.clone(),
                        status: TaskExecutionStatus::Failed,
                        output: None,
                        errors: vec![detail.message.clone()],
                        error_info: Some(detail),
                        duration: started_instant.elapsed(),
                        retry_count,
                        started_at,
                        completed_at: chrono::Utc::now(),
                    };
                    return TaskOutcome::Failed { record: failed_record };
                }
            }
        }
    }

    /// Renders `TaskStep.input` against the workflow-wide context, producing
    /// the JSON object a task receives as its own `{{input...}}` namespace.
    ///
    /// Resolution note: a task's own `HttpRequestSpec`/`body_template`
    /// templates see `{{input.X}}` as *this task's* resolved argument `X`
    /// (the result of this function), not the workflow's raw caller input —
    /// only this step's `input` map is rendered against the caller input and
    /// prior task outputs directly. This keeps a task's own resource
    /// templates self-contained and reusable across workflows that wire
    /// different `TaskStep.input` mappings onto the same `task_ref`.
    fn render_task_input(&self, step: &TaskStep, workflow_ctx: &TemplateContext) -> Result<Json, EngineError> {
        let mut rendered = serde_json::Map::with_capacity(step.input.len());
        for (key, expr) in &step.input {
            rendered.insert(key.clone(), template::render(expr, workflow_ctx)?);
        }
        Ok(Json::Object(rendered))
    }

    fn task_timeout(&self, step: &TaskStep, resource: &TaskResource) -> Duration {
        let resource_timeout = match resource {
            TaskResource::Http { timeout, .. } => *timeout,
            TaskResource::SubWorkflow { .. } => None,
        };
        step.timeout.or(resource_timeout).unwrap_or(self.config.default_http_timeout)
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_once(
        self: &Arc<Self>,
        _spec: &WorkflowSpec,
        step: &TaskStep,
        resource: &TaskResource,
        task_ctx: &TemplateContext,
        task_input: &Json,
        execution_id: Uuid,
        call_stack: &WorkflowCallStack,
        cancel: &CancellationToken,
        workflow_deadline_at: TokioInstant,
        task_timeout: Duration,
    ) -> Result<Json, AttemptError> {
        let remaining = workflow_deadline_at.saturating_duration_since(TokioInstant::now());
        let bound = remaining.min(task_timeout);
        let attempt_deadline = TokioInstant::now() + bound;

        let node_ctx = NodeContext {
            workflow_id: Uuid::nil(),
            execution_id,
            task_id: step.id.clone(),
            input: task_input.clone(),
            secrets: HashMap::new(),
        };

        match resource {
            TaskResource::Http { request, .. } => {
                let rendered = match self.render_http_request(request, task_ctx) {
                    Ok(r) => r,
                    Err(err) => return Err(AttemptError::Fatal(ErrorKind::TemplateResolution, err.to_string())),
                };
                let node = HttpNode::new(bound);
                let fut = node.execute(rendered, &node_ctx);
                run_with_deadline(fut, attempt_deadline, cancel).await
            }
            TaskResource::SubWorkflow { workflow_ref } => {
                let next_stack = match call_stack.pushed(workflow_ref) {
                    Ok(s) => s,
                    Err(err) => {
                        let engine_err: EngineError = err.into();
                        let kind = match &engine_err {
                            EngineError::SubworkflowCycle { .. } => ErrorKind::SubworkflowCycle,
                            EngineError::SubworkflowDepth { .. } => ErrorKind::SubworkflowDepth,
                            other => unreachable!("CallStackError only converts to cycle/depth errors, got {other:?}"),
                        };
                        return Err(AttemptError::Fatal(kind, engine_err.to_string()));
                    }
                };
                let invoker = Arc::new(OrchestratorInvoker {
                    orchestrator: Arc::clone(self),
                    next_stack,
                    cancel: cancel.clone(),
                });
                let node = SubWorkflowNode::new(workflow_ref.clone(), invoker);
                let fut = node.execute(task_input.clone(), &node_ctx);
                run_with_deadline(fut, attempt_deadline, cancel).await
            }
        }
    }

    fn render_http_request(&self, request: &crate::model::HttpRequestSpec, ctx: &TemplateContext) -> Result<Json, EngineError> {
        let method = render_to_string(&request.method, ctx)?;
        let url = render_to_string(&request.url, ctx)?;
        let mut headers = serde_json::Map::new();
        for (key, value) in &request.headers {
            headers.insert(key.clone(), Json::String(render_to_string(value, ctx)?));
        }
        let body = match &request.body_template {
            Some(body) => Some(template::render(body, ctx)?),
            None => None,
        };
        Ok(json!({
            "method": method,
            "url": url,
            "headers": Json::Object(headers),
            "body": body,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn task_failed(
        &self,
        execution_id: Uuid,
        step: &TaskStep,
        kind: ErrorKind,
        message: String,
        retry_count: u32,
        started_at: chrono::DateTime<chrono::Utc>,
        started_instant: std::time::Instant,
    ) -> TaskOutcome {
        let elapsed = started_instant.elapsed();
        let detail = ErrorDetail {
            task_id: step.id.clone(),
            task_name: None,
            kind,
            message: message.clone(),
            code: None,
            service_name: None,
            url: None,
            http_status: None,
            response_body_preview: None,
            retry_attempts: retry_count,
            is_retryable: false,
            occurred_at: chrono::Utc::now(),
            duration_until_error_ms: elapsed.as_millis() as u64,
            suggestion: None,
        };
        TaskOutcome::Failed {
            record: TaskExecutionRecord {
                execution_id,
                task_id: step.id.clone(),
                task_ref: step.task_ref.clone(),
                status: TaskExecutionStatus::Failed,
                output: None,
                errors: vec![message],
                error_info: Some(detail),
                duration: elapsed,
                retry_count,
                started_at,
                completed_at: chrono::Utc::now(),
            },
        }
    }

    fn cancelled_record(
        &self,
        step: &TaskStep,
        execution_id: Uuid,
        started_at: chrono::DateTime<chrono::Utc>,
        started_instant: std::time::Instant,
        retry_count: u32,
    ) -> TaskExecutionRecord {
        let elapsed = started_instant.elapsed();
        TaskExecutionRecord {
            execution_id,
            task_id: step.id.clone(),
            task_ref: step.task_ref.clone(),
            status: TaskExecutionStatus::Failed,
            output: None,
            errors: vec!["execution cancelled".to_string()],
            error_info: Some(ErrorDetail {
                task_id: step.id.clone(),
                task_name: None,
                kind: ErrorKind::Cancelled,
                message: "execution cancelled".to_string(),
                code: None,
                service_name: None,
                url: None,
                http_status: None,
                response_body_preview: None,
                retry_attempts: retry_count,
                is_retryable: false,
                occurred_at: chrono::Utc::now(),
                duration_until_error_ms: elapsed.as_millis() as u64,
                suggestion: None,
            }),
            duration: elapsed,
            retry_count,
            started_at,
            completed_at: chrono::Utc::now(),
        }
    }

    fn skipped_record(
        &self,
        step: &TaskStep,
        execution_id: Uuid,
        started_at: chrono::DateTime<chrono::Utc>,
        reason: &str,
    ) -> TaskExecutionRecord {
        let now = chrono::Utc::now();
        TaskExecutionRecord {
            execution_id,
            task_id: step.id.clone(),
            task_ref: step.task_ref.clone(),
            status: TaskExecutionStatus::Skipped,
            output: None,
            errors: vec![reason.to_string()],
            error_info: None,
            duration: Duration::ZERO,
            retry_count: 0,
            started_at,
            completed_at: now,
        }
    }
}

/// Adapts an in-flight sub-workflow recursion to `nodes::WorkflowInvoker`,
/// closing over the already-validated next call stack (checked by the
/// caller via `WorkflowCallStack::pushed` before this is constructed) so
/// `nodes` never needs to know what a call stack is.
struct OrchestratorInvoker {
    orchestrator: Arc<Orchestrator>,
    next_stack: WorkflowCallStack,
    cancel: CancellationToken,
}

#[async_trait]
impl WorkflowInvoker for OrchestratorInvoker {
    async fn invoke(&self, workflow_ref: &str, input: Json, _ctx: &NodeContext) -> Result<Json, NodeError> {
        let result = self
            .orchestrator
            .execute_with_stack(workflow_ref, input, self.next_stack.clone(), self.cancel.clone())
            .await
            .map_err(|e| NodeError::fatal(e.to_string()))?;

        if result.record.status != ExecutionStatus::Succeeded {
            return Err(NodeError::fatal(format!(
                "sub-workflow '{workflow_ref}' finished with status {:?}",
                result.record.status
            )));
        }
        Ok(result.output)
    }
}

/// Races a node's `execute` future against the composed deadline and the
/// caller's cancellation token — the "min(workflowDeadline, taskTimeout,
/// callerDeadline)" effective deadline from §4.4/§5.
async fn run_with_deadline<F>(fut: F, deadline: TokioInstant, cancel: &CancellationToken) -> Result<Json, AttemptError>
where
    F: std::future::Future<Output = Result<Json, NodeError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(AttemptError::Cancelled),
        res = tokio::time::timeout_at(deadline, fut) => {
            match res {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(node_err)) => Err(AttemptError::Node(node_err)),
                Err(_elapsed) => Err(AttemptError::Timeout),
            }
        }
    }
}

fn is_retryable(node_err: &NodeError, policy: &RetryPolicy) -> bool {
    if node_err.is_retryable() {
        return true;
    }
    if let Some(status) = node_err.failure().http_status {
        return policy.retryable_status_codes.contains(&status);
    }
    false
}

/// Pre-jitter delay doubles (capped at `maxDelay`) for exponential backoff,
/// constant for fixed backoff (§3, §4.4 invariant "d_{i+1} >= min(2*d_i,
/// maxDelay)"), then jittered by +/-20%.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = base_delay(policy, attempt);
    jitter(base)
}

fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    match policy.backoff {
        BackoffKind::Fixed => policy.initial_delay,
        BackoffKind::Exponential => {
            let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
            let scaled = policy.initial_delay.checked_mul(factor as u32).unwrap_or(policy.max_delay);
            if policy.max_delay > Duration::ZERO {
                scaled.min(policy.max_delay)
            } else {
                scaled
            }
        }
    }
}

fn jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.8..=1.2);
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

fn error_detail_from_node(step: &TaskStep, node_err: &NodeError, retry_count: u32, elapsed: Duration) -> ErrorDetail {
    let failure = node_err.failure();
    ErrorDetail {
        task_id: step.id.clone(),
        task_name: None,
        kind: ErrorKind::TransportError,
        message: failure.message.clone(),
        code: None,
        service_name: failure.service_name.clone(),
        url: failure.url.clone(),
        http_status: failure.http_status,
        response_body_preview: failure.response_body_preview.clone(),
        retry_attempts: retry_count,
        is_retryable: node_err.is_retryable(),
        occurred_at: chrono::Utc::now(),
        duration_until_error_ms: elapsed.as_millis() as u64,
        suggestion: None,
    }
}

/// Renders a single string field (URL, method, header value) and coerces
/// the result back to a string — a whole-string template that resolves to
/// a non-string JSON value (e.g. a number) is serialized, matching
/// `template::stringify`'s behaviour for embedded references.
fn render_to_string(s: &str, ctx: &TemplateContext) -> Result<String, EngineError> {
    match template::render(&Json::String(s.to_string()), ctx)? {
        Json::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn is_truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::events::NullEventSink;
    use crate::model::{HttpRequestSpec, InputParam, ParamType, TaskResource, TaskStep, WorkflowSpec};
    use crate::recorder::InMemoryRecorder;
    use serde_json::json;
    use std::collections::HashMap;

    fn orchestrator(catalog: StaticCatalog) -> Arc<Orchestrator> {
        Orchestrator::new(
            Arc::new(catalog),
            Arc::new(InMemoryRecorder::new()),
            Arc::new(NullEventSink),
            crate::stats::StatsAggregator::new(),
            AnomalyDetector::new(),
            OrchestratorConfig::default(),
        )
    }

    fn http_task(id: &str, depends_on: Vec<&str>) -> TaskStep {
        TaskStep {
            id: id.to_string(),
            task_ref: format!("{id}-ref"),
            depends_on: depends_on.into_iter().map(str::to_string).collect(),
            input: HashMap::new(),
            retry: None,
            timeout: None,
            condition: None,
        }
    }

    fn ok_http_resource() -> TaskResource {
        TaskResource::Http {
            request: HttpRequestSpec {
                method: "GET".to_string(),
                url: "https://example.invalid/ok".to_string(),
                headers: HashMap::new(),
                body_template: None,
            },
            input_schema: None,
            output_schema: None,
            timeout: Some(Duration::from_millis(200)),
        }
    }

    #[tokio::test]
    async fn workflow_not_found_returns_engine_error_with_no_record() {
        let orch = orchestrator(StaticCatalog::new());
        let err = orch.execute("missing", json!({}), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::WorkflowNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_dispatch() {
        let mut spec = WorkflowSpec::new("wf", vec![http_task("a", vec![])]);
        spec.input.insert("name".to_string(), InputParam { param_type: ParamType::String, required: true, description: None });
        let catalog = StaticCatalog::new().with_workflow(spec).with_task("a-ref", ok_http_resource());
        let orch = orchestrator(catalog);

        let err = orch.execute("wf", json!({}), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::InputValidation(_)));
    }

    #[tokio::test]
    async fn subworkflow_cycle_is_rejected_before_dispatch() {
        let wf_a = WorkflowSpec::new("a", vec![TaskStep { id: "call-b".into(), task_ref: "to-b".into(), ..http_task("call-b", vec![]) }]);
        let catalog = StaticCatalog::new()
            .with_workflow(wf_a)
            .with_task("to-b", TaskResource::SubWorkflow { workflow_ref: "a".to_string() });
        let orch = orchestrator(catalog);

        let result = orch.execute("a", json!({}), CancellationToken::new()).await.expect("top-level execute succeeds");
        assert_eq!(result.record.status, ExecutionStatus::Failed);
        let failure = &result.record.task_executions[0];
        assert_eq!(failure.error_info.as_ref().unwrap().kind, ErrorKind::SubworkflowCycle);
    }
}
