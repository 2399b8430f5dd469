//! `api` crate — the HTTP ingress the engine is exercised through end to
//! end. Out of scope as a product surface (§1), but needed for the
//! workspace to run, the way the teacher's `api` crate gave a thin `axum`
//! front end over `engine`/`db`. Routes:
//!
//!   POST   /api/v1/workflows/:name/execute
//!   GET    /api/v1/workflows/:name/optimizations
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:name
//!   DELETE /api/v1/workflows/:name
//!   GET    /api/v1/executions
//!   GET    /api/v1/executions/:id
//!   GET    /api/v1/executions/:id/stream
//!   POST   /hooks/:suffix

pub mod error;
pub mod handlers;
pub mod secrets;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use catalog::CatalogCache;
use db::DbPool;
use engine::anomaly::AnomalyDetector;
use engine::recorder::ExecutionRecorder;
use engine::Orchestrator;
use notify::NotifyHub;
use queue::SecretResolver;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub catalog: Arc<CatalogCache>,
    pub orchestrator: Arc<Orchestrator>,
    pub recorder: Arc<dyn ExecutionRecorder>,
    pub anomaly: AnomalyDetector,
    pub notify: NotifyHub,
    pub secrets: Arc<dyn SecretResolver>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let workflows = Router::new()
        .route("/", get(handlers::workflows::list).post(handlers::workflows::create))
        .route("/:name", get(handlers::workflows::get).delete(handlers::workflows::delete))
        .route("/:name/execute", post(handlers::executions::execute))
        .route("/:name/optimizations", get(handlers::executions::optimizations));

    let executions = Router::new()
        .route("/", get(handlers::executions::list))
        .route("/:id", get(handlers::executions::get))
        .route("/:id/stream", get(handlers::executions::stream));

    let api_router = Router::new().nest("/workflows", workflows).nest("/executions", executions);

    Router::new()
        .nest("/api/v1", api_router)
        .route("/hooks/:suffix", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
