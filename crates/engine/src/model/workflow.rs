//! Declarative workflow/task definitions (spec.md §3).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A declared input parameter's type. Unknown declared types are tolerated
/// by `InputValidator` (§4.3: "Unknown declared types pass").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// Anything the caller declares that isn't one of the above; validation
    /// against it always passes.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputParam {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// How a workflow run is kicked off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Trigger {
    Schedule(ScheduleTrigger),
    Webhook(WebhookTrigger),
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTrigger {
    pub id: String,
    /// Standard 5-field cron expression.
    pub cron: String,
    #[serde(default)]
    pub input: Json,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTrigger {
    pub id: String,
    /// URL path segment matched against `/hooks/<suffix>`, case-insensitive,
    /// leading-slash tolerant (§4.6).
    pub path: String,
    #[serde(default)]
    pub secret_ref: Option<String>,
    /// Header carrying the `sha256=<hex>` HMAC signature.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    /// Path mappings rooted at `$.payload.` used to build the execution
    /// input from the raw webhook body (§4.6).
    #[serde(default)]
    pub input_mapping: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_signature_header() -> String {
    "X-Signature".to_string()
}

/// Exponential vs. fixed back-off between retry attempts (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// HTTP status codes that should be retried in addition to 5xx,
    /// layered on top of the node's own retryable/fatal classification
    /// (§4.4: "configured retryable statuses").
    #[serde(default)]
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffKind::Fixed,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            retryable_status_codes: Vec::new(),
        }
    }
}

mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// A leaf executable definition: either an HTTP call or a reference to
/// another workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskResource {
    Http {
        request: HttpRequestSpec,
        #[serde(default)]
        input_schema: Option<Json>,
        #[serde(default)]
        output_schema: Option<Json>,
        #[serde(default, with = "option_duration_millis")]
        timeout: Option<Duration>,
    },
    SubWorkflow {
        workflow_ref: String,
    },
}

mod option_duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(d)?;
        Ok(ms.map(Duration::from_millis))
    }
}

/// A request template; every string field may contain `{{...}}` references
/// resolved against the running `TemplateContext` (§4.5, §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body_template: Option<Json>,
}

/// A node in the workflow DAG, prior to graph compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: String,
    pub task_ref: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub input: HashMap<String, Json>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    /// Skip this task unless the (already-rendered) condition evaluates
    /// truthy. Kept as an opaque template string — the orchestrator resolves
    /// and checks it for a non-empty/non-false/non-null result rather than
    /// running it through a general expression evaluator (§9).
    #[serde(default)]
    pub condition: Option<String>,
}

/// The declarative definition of a workflow (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input: HashMap<String, InputParam>,
    #[serde(default)]
    pub output: HashMap<String, String>,
    pub tasks: Vec<TaskStep>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl WorkflowSpec {
    /// Convenience constructor mirroring the teacher's test helper.
    pub fn new(name: impl Into<String>, tasks: Vec<TaskStep>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            description: None,
            input: HashMap::new(),
            output: HashMap::new(),
            tasks,
            triggers: vec![Trigger::Manual],
            tags: Vec::new(),
            categories: Vec::new(),
        }
    }
}
