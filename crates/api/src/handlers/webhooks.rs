//! `/hooks/:suffix` — HTTP framing for `queue::webhook`'s path match +
//! signature verification + input mapping (§4.6).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use queue::webhook::{apply_input_mapping, find_match, verify_signature};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::AppState;

pub async fn handle_webhook(
    Path(suffix): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let matched = find_match(&state.catalog, &suffix)
        .ok_or_else(|| ApiError::not_found(format!("no enabled webhook trigger matches path '{suffix}'")))?;

    let signature = headers.get(&matched.trigger.signature_header).and_then(|v| v.to_str().ok());
    verify_signature(state.secrets.as_ref(), &matched.trigger, signature, &body)
        .await
        .map_err(|err| ApiError::unauthorized(err.to_string()))?;

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let input = apply_input_mapping(&matched.trigger, &payload);

    let result = state
        .orchestrator
        .execute(&matched.workflow.name, input, CancellationToken::new())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": result.record.id, "status": result.record.status }))))
}
