//! Workflow definition CRUD, backed by the Postgres-backed `CatalogSource`
//! reference implementation (`db::repository::workflows`) and read back
//! through `CatalogCache` everywhere else. A write here is only visible to
//! the rest of the system once the cache's next refresh (forced below)
//! picks it up.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use engine::model::WorkflowSpec;
use engine::WorkflowCatalog;

use crate::error::ApiError;
use crate::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<WorkflowSpec>> {
    Json(state.catalog.list_workflows())
}

pub async fn get(Path(name): Path<String>, State(state): State<AppState>) -> Result<Json<WorkflowSpec>, ApiError> {
    state
        .catalog
        .workflow(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("workflow '{name}' not found")))
}

pub async fn create(
    State(state): State<AppState>,
    Json(spec): Json<WorkflowSpec>,
) -> Result<(StatusCode, Json<WorkflowSpec>), ApiError> {
    db::repository::workflows::upsert_workflow(&state.pool, &spec).await?;
    let _ = state.catalog.refresh_now().await;
    Ok((StatusCode::CREATED, Json(spec)))
}

pub async fn delete(Path(name): Path<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    db::repository::workflows::delete_workflow(&state.pool, &name).await?;
    let _ = state.catalog.refresh_now().await;
    Ok(StatusCode::NO_CONTENT)
}
