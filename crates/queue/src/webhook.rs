//! Webhook half of the TriggerLoop (C6, spec.md §4.6, §6.6): path matching,
//! HMAC-SHA256 signature verification, and `inputMapping` application. The
//! HTTP framing itself (the `/hooks/:suffix` route) lives in `api`; this
//! module is the part that would stay identical if that framing were swapped
//! for gRPC tomorrow.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value as Json;
use sha2::Sha256;
use tracing::warn;

use catalog::CatalogCache;
use engine::model::{Trigger, Value, WebhookTrigger, WorkflowSpec};

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Resolves a `WebhookTrigger.secretRef` to its plaintext value. `db`
/// supplies the production (encrypted-at-rest) implementation; tests use a
/// plain in-memory map.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, secret_ref: &str) -> anyhow::Result<Option<String>>;
}

/// A matched workflow + the trigger that claimed the request path.
pub struct WebhookMatch {
    pub workflow: WorkflowSpec,
    pub trigger: WebhookTrigger,
}

/// Case-insensitive, leading-slash-tolerant path match against every
/// enabled `WebhookTrigger` currently in the catalog.
///
/// Per §9's open question ("first-wins vs reject is unclear; spec states
/// first-wins with warning"), a request path claimed by more than one
/// trigger is delivered to the first match found and the collision is
/// logged — see DESIGN.md.
pub fn find_match(catalog: &CatalogCache, request_path: &str) -> Option<WebhookMatch> {
    let target = normalize_path(request_path);
    let mut matches: Vec<WebhookMatch> = Vec::new();

    for workflow in catalog.list_workflows() {
        for trigger in &workflow.triggers {
            if let Trigger::Webhook(webhook) = trigger {
                if webhook.enabled && normalize_path(&webhook.path) == target {
                    matches.push(WebhookMatch { workflow: workflow.clone(), trigger: webhook.clone() });
                }
            }
        }
    }

    if matches.len() > 1 {
        warn!(
            path = %request_path,
            candidates = matches.len(),
            "multiple enabled webhook triggers claim this path; delivering to the first"
        );
    }
    matches.into_iter().next()
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_ascii_lowercase()
}

/// Verifies `sha256=<hex>` HMAC-SHA256 over the raw body (§6.6). A trigger
/// with no `secretRef` configured skips verification entirely — the
/// presence of `secretRef` is what turns signing on.
pub async fn verify_signature(
    resolver: &dyn SecretResolver,
    trigger: &WebhookTrigger,
    header_value: Option<&str>,
    raw_body: &[u8],
) -> Result<(), WebhookError> {
    let Some(secret_ref) = &trigger.secret_ref else {
        return Ok(());
    };
    let secret = resolver
        .resolve(secret_ref)
        .await
        .map_err(|_| WebhookError::UnknownSecret(secret_ref.clone()))?
        .ok_or_else(|| WebhookError::UnknownSecret(secret_ref.clone()))?;

    let header_value = header_value.ok_or_else(|| WebhookError::MissingSignature(trigger.signature_header.clone()))?;
    let hex_sig = header_value.strip_prefix("sha256=").ok_or(WebhookError::BadSignature)?;
    let expected = hex::decode(hex_sig).map_err(|_| WebhookError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::BadSignature)?;
    mac.update(raw_body);
    mac.verify_slice(&expected).map_err(|_| WebhookError::BadSignature)
}

/// Builds the execution input from the trigger's `inputMapping`, each value
/// a dot-path rooted at `$.payload.` into the parsed webhook body (§4.6).
/// An empty mapping passes the whole payload through unchanged, since a
/// trigger that declares no mapping presumably wants the raw body as input.
///
/// Per §6.4, a path that doesn't resolve is silently dropped here (unlike
/// task-input templates, where the same situation is an error) — the
/// mapping is allowed to be speculative about the shape of a third party's
/// payload.
pub fn apply_input_mapping(trigger: &WebhookTrigger, payload: &Json) -> Json {
    if trigger.input_mapping.is_empty() {
        return payload.clone();
    }

    let payload_value = Value::from(payload.clone());
    let mut input = serde_json::Map::with_capacity(trigger.input_mapping.len());
    for (key, path) in &trigger.input_mapping {
        let Some(rest) = path.strip_prefix("$.payload") else {
            warn!(path = %path, "inputMapping path is not rooted at $.payload, dropping");
            continue;
        };
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        if let Some(resolved) = payload_value.get_path(rest) {
            input.insert(key.clone(), resolved.clone().into());
        }
    }
    Json::Object(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::model::TaskStep;
    use serde_json::json;
    use std::collections::HashMap;

    struct StaticSecrets(HashMap<String, String>);

    #[async_trait]
    impl SecretResolver for StaticSecrets {
        async fn resolve(&self, secret_ref: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.get(secret_ref).cloned())
        }
    }

    fn webhook_trigger(path: &str, secret_ref: Option<&str>) -> WebhookTrigger {
        WebhookTrigger {
            id: "t1".to_string(),
            path: path.to_string(),
            secret_ref: secret_ref.map(str::to_string),
            signature_header: "X-Signature".to_string(),
            input_mapping: HashMap::new(),
            enabled: true,
        }
    }

    fn workflow_with_webhook(name: &str, trigger: WebhookTrigger) -> WorkflowSpec {
        let mut spec = WorkflowSpec::new(name, vec![TaskStep {
            id: "t1".to_string(),
            task_ref: "noop".to_string(),
            depends_on: vec![],
            input: HashMap::new(),
            retry: None,
            timeout: None,
            condition: None,
        }]);
        spec.triggers = vec![Trigger::Webhook(trigger)];
        spec
    }

    #[tokio::test]
    async fn path_match_is_case_insensitive_and_leading_slash_tolerant() {
        let source = catalog::StaticCatalogSource::new()
            .with_workflow(workflow_with_webhook("orders", webhook_trigger("/Orders/New", None)));
        let cache = CatalogCache::bootstrap(std::sync::Arc::new(source), None).await.unwrap();

        let matched = find_match(&cache, "orders/new").expect("should match");
        assert_eq!(matched.workflow.name, "orders");
    }

    #[tokio::test]
    async fn disabled_trigger_does_not_match() {
        let mut trigger = webhook_trigger("hook", None);
        trigger.enabled = false;
        let source = catalog::StaticCatalogSource::new().with_workflow(workflow_with_webhook("wf", trigger));
        let cache = CatalogCache::bootstrap(std::sync::Arc::new(source), None).await.unwrap();

        assert!(find_match(&cache, "hook").is_none());
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected_when_secret_configured() {
        let trigger = webhook_trigger("hook", Some("sekrit"));
        let resolver = StaticSecrets(HashMap::from([("sekrit".to_string(), "s3cret".to_string())]));
        let err = verify_signature(&resolver, &trigger, None, b"{}").await.unwrap_err();
        assert!(matches!(err, WebhookError::MissingSignature(_)));
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let trigger = webhook_trigger("hook", Some("sekrit"));
        let resolver = StaticSecrets(HashMap::from([("sekrit".to_string(), "s3cret".to_string())]));
        let body = b"{\"hello\":\"world\"}";

        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(body);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        verify_signature(&resolver, &trigger, Some(&signature), body).await.unwrap();
    }

    #[tokio::test]
    async fn tampered_body_fails_verification() {
        let trigger = webhook_trigger("hook", Some("sekrit"));
        let resolver = StaticSecrets(HashMap::from([("sekrit".to_string(), "s3cret".to_string())]));

        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(b"original");
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let err = verify_signature(&resolver, &trigger, Some(&signature), b"tampered").await.unwrap_err();
        assert!(matches!(err, WebhookError::BadSignature));
    }

    #[test]
    fn input_mapping_resolves_paths_rooted_at_payload() {
        let mut trigger = webhook_trigger("hook", None);
        trigger.input_mapping.insert("orderId".to_string(), "$.payload.order.id".to_string());
        trigger.input_mapping.insert("missing".to_string(), "$.payload.nope".to_string());

        let payload = json!({ "order": { "id": "abc-123" } });
        let input = apply_input_mapping(&trigger, &payload);

        assert_eq!(input["orderId"], json!("abc-123"));
        assert!(input.get("missing").is_none());
    }

    #[test]
    fn empty_mapping_passes_the_whole_payload_through() {
        let trigger = webhook_trigger("hook", None);
        let payload = json!({ "anything": 1 });
        assert_eq!(apply_input_mapping(&trigger, &payload), payload);
    }
}
