//! Input validation against a workflow's declared `input` parameters
//! (spec.md §4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::model::{ParamType, WorkflowSpec};

/// One absent-but-required field (`MissingInput{field,type,description}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingInput {
    pub field: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: Option<String>,
}

/// One present-but-wrong-shaped field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidInput {
    pub field: String,
    pub reason: String,
}

/// `{valid, missing[], invalid[], suggestedPrompt?}` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub missing: Vec<MissingInput>,
    pub invalid: Vec<InvalidInput>,
    pub suggested_prompt: Option<String>,
}

/// Checks a caller-supplied execution input against a `WorkflowSpec`'s
/// declared parameters: every `required` param must be present, and every
/// present param's JSON shape must match its declared `type`. Unknown
/// declared types, and input fields not declared at all, pass through
/// untouched — this is a gate, not a schema enforcer.
pub struct InputValidator;

impl InputValidator {
    pub fn validate(spec: &WorkflowSpec, input: &Json) -> ValidationResult {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();
        let empty = serde_json::Map::new();
        let provided = input.as_object().unwrap_or(&empty);

        for (name, param) in &spec.input {
            match provided.get(name) {
                None => {
                    if param.required {
                        missing.push(MissingInput {
                            field: name.clone(),
                            param_type: param.param_type,
                            description: param.description.clone(),
                        });
                    }
                }
                Some(value) => {
                    if let Some(reason) = type_mismatch(param.param_type, value) {
                        invalid.push(InvalidInput { field: name.clone(), reason });
                    }
                }
            }
        }

        let suggested_prompt = suggested_prompt(&missing, &invalid);
        ValidationResult { valid: missing.is_empty() && invalid.is_empty(), missing, invalid, suggested_prompt }
    }
}

/// A human-readable join of missing + invalid messages, or `None` when
/// there's nothing to report.
fn suggested_prompt(missing: &[MissingInput], invalid: &[InvalidInput]) -> Option<String> {
    if missing.is_empty() && invalid.is_empty() {
        return None;
    }
    let mut parts: Vec<String> = Vec::with_capacity(missing.len() + invalid.len());
    parts.extend(missing.iter().map(|m| format!("missing required input '{}'", m.field)));
    parts.extend(invalid.iter().map(|i| format!("input '{}': {}", i.field, i.reason)));
    Some(parts.join("; "))
}

fn type_mismatch(expected: ParamType, value: &Json) -> Option<String> {
    let matches = match expected {
        ParamType::String => value.is_string(),
        ParamType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
        ParamType::Number => value.is_number(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Object => value.is_object(),
        ParamType::Array => value.is_array(),
        ParamType::Unknown => true,
    };
    if matches {
        None
    } else {
        Some(format!("expected {expected:?}, got {}", kind_name(value)))
    }
}

fn kind_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InputParam;
    use serde_json::json;

    fn spec_with(params: Vec<(&str, ParamType, bool)>) -> WorkflowSpec {
        let mut spec = WorkflowSpec::new("wf", vec![]);
        for (name, param_type, required) in params {
            spec.input.insert(
                name.to_string(),
                InputParam { param_type, required, description: None },
            );
        }
        spec
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let spec = spec_with(vec![("name", ParamType::String, true)]);
        let result = InputValidator::validate(&spec, &json!({}));
        assert!(!result.valid);
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].field, "name");
        assert!(result.suggested_prompt.unwrap().contains("name"));
    }

    #[test]
    fn missing_optional_field_is_accepted() {
        let spec = spec_with(vec![("name", ParamType::String, false)]);
        let result = InputValidator::validate(&spec, &json!({}));
        assert!(result.valid);
        assert!(result.suggested_prompt.is_none());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let spec = spec_with(vec![("count", ParamType::Integer, true)]);
        let result = InputValidator::validate(&spec, &json!({"count": "five"}));
        assert!(!result.valid);
        assert_eq!(result.invalid[0].field, "count");
        assert!(result.missing.is_empty());
    }

    #[test]
    fn unknown_declared_type_always_passes() {
        let spec = spec_with(vec![("anything", ParamType::Unknown, true)]);
        let result = InputValidator::validate(&spec, &json!({"anything": [1, 2, 3]}));
        assert!(result.valid);
    }

    #[test]
    fn undeclared_extra_fields_are_ignored() {
        let spec = spec_with(vec![("name", ParamType::String, true)]);
        let result = InputValidator::validate(&spec, &json!({"name": "a", "extra": true}));
        assert!(result.valid);
    }

    #[test]
    fn integer_type_accepts_whole_numbers_only_as_integer() {
        let spec = spec_with(vec![("count", ParamType::Integer, true)]);
        let result = InputValidator::validate(&spec, &json!({"count": 3}));
        assert!(result.valid);
    }

    #[test]
    fn suggested_prompt_joins_missing_and_invalid() {
        let spec = spec_with(vec![("name", ParamType::String, true), ("count", ParamType::Integer, true)]);
        let result = InputValidator::validate(&spec, &json!({"count": "nope"}));
        let prompt = result.suggested_prompt.unwrap();
        assert!(prompt.contains("name"));
        assert!(prompt.contains("count"));
    }
}
