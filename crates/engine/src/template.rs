//! Template resolution: `{{input.X}}` / `{{tasks.ID.output.path}}` (§4.5,
//! §6.4). This runs entirely inside `engine`, before a task's resolved JSON
//! ever reaches a `nodes::ExecutableNode` — keeping `nodes` free of any
//! dependency on the engine's execution state.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::error::EngineError;
use crate::model::Value;

/// Everything a template reference inside one task's `input` can resolve
/// against: the workflow's caller-supplied input, and the outputs of tasks
/// that have already completed.
pub struct TemplateContext {
    pub input: Value,
    pub task_outputs: HashMap<String, Value>,
}

impl TemplateContext {
    pub fn new(input: Value) -> Self {
        Self { input, task_outputs: HashMap::new() }
    }

    pub fn record_output(&mut self, task_id: impl Into<String>, output: Value) {
        self.task_outputs.insert(task_id.into(), output);
    }

    fn resolve(&self, path: &str) -> Option<&Value> {
        if let Some(rest) = path.strip_prefix("input.") {
            return self.input.get_path(rest);
        }
        if path == "input" {
            return Some(&self.input);
        }
        if let Some(rest) = path.strip_prefix("tasks.") {
            let (task_id, rest) = rest.split_once('.')?;
            let rest = rest.strip_prefix("output")?;
            let rest = rest.strip_prefix('.').unwrap_or(rest);
            return self.task_outputs.get(task_id)?.get_path(rest);
        }
        None
    }
}

/// Render every `{{...}}` reference in `value`, recursing through objects
/// and arrays. A string that is *entirely* one template reference (modulo
/// surrounding whitespace) resolves to the referenced value's native JSON
/// type; a reference embedded in a larger string is stringified in place.
pub fn render(value: &Json, ctx: &TemplateContext) -> Result<Json, EngineError> {
    match value {
        Json::String(s) => render_string(s, ctx),
        Json::Array(items) => {
            let rendered: Result<Vec<Json>, EngineError> =
                items.iter().map(|item| render(item, ctx)).collect();
            Ok(Json::Array(rendered?))
        }
        Json::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                rendered.insert(key.clone(), render(val, ctx)?);
            }
            Ok(Json::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn render_string(s: &str, ctx: &TemplateContext) -> Result<Json, EngineError> {
    if let Some(path) = whole_template(s) {
        let resolved = ctx.resolve(path).ok_or_else(|| EngineError::TemplateResolution {
            path: path.to_string(),
            reason: "reference did not resolve to any value".to_string(),
        })?;
        return Ok(Json::from(resolved.clone()));
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let path = after[..end].trim();
        let resolved = ctx.resolve(path).ok_or_else(|| EngineError::TemplateResolution {
            path: path.to_string(),
            reason: "reference did not resolve to any value".to_string(),
        })?;
        out.push_str(&stringify(resolved));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(Json::String(out))
}

/// Returns `Some(path)` if the whole (trimmed) string is a single
/// `{{path}}` reference and nothing else.
fn whole_template(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => s.clone(),
        Value::Arr(_) | Value::Obj(_) => {
            let json: Json = value.clone().into();
            json.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TemplateContext {
        let mut ctx = TemplateContext::new(Value::from(json!({ "name": "Ada", "count": 3 })));
        ctx.record_output("fetch", Value::from(json!({ "status": 200, "body": { "id": "xyz" } })));
        ctx
    }

    #[test]
    fn whole_string_template_preserves_native_type() {
        let rendered = render(&json!("{{input.count}}"), &ctx()).unwrap();
        assert_eq!(rendered, json!(3));
    }

    #[test]
    fn embedded_template_is_stringified() {
        let rendered = render(&json!("hello {{input.name}}!"), &ctx()).unwrap();
        assert_eq!(rendered, json!("hello Ada!"));
    }

    #[test]
    fn resolves_nested_task_output_path() {
        let rendered = render(&json!("{{tasks.fetch.output.body.id}}"), &ctx()).unwrap();
        assert_eq!(rendered, json!("xyz"));
    }

    #[test]
    fn recurses_through_objects_and_arrays() {
        let rendered = render(
            &json!({ "a": ["{{input.name}}", { "b": "{{tasks.fetch.output.status}}" }] }),
            &ctx(),
        )
        .unwrap();
        assert_eq!(rendered, json!({ "a": ["Ada", { "b": 200 }] }));
    }

    #[test]
    fn unresolvable_reference_is_an_error() {
        let err = render(&json!("{{input.missing}}"), &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::TemplateResolution { .. }));
    }

    #[test]
    fn plain_string_without_templates_passes_through() {
        let rendered = render(&json!("no templates here"), &ctx()).unwrap();
        assert_eq!(rendered, json!("no templates here"));
    }
}
