//! Maps engine/db/queue errors onto the HTTP surface (§6.3, §6.7). Every
//! handler returns `Result<_, ApiError>` rather than a bare `StatusCode`, so
//! the exit-code taxonomy travels all the way to the response body instead
//! of being swallowed at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use engine::{EngineError, ExitCode};
use serde_json::json;

pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: ExitCode::NotFound.as_str(), message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: ExitCode::InvalidInput.as_str(), message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, code: "Unauthorized", message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, code: ExitCode::Internal.as_str(), message: message.into() }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match err.exit_code() {
            ExitCode::Ok => StatusCode::OK,
            ExitCode::NotFound => StatusCode::NOT_FOUND,
            ExitCode::InvalidInput | ExitCode::CycleDetected | ExitCode::MaxDepthExceeded => StatusCode::BAD_REQUEST,
            ExitCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ExitCode::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            ExitCode::UpstreamFailed => StatusCode::BAD_GATEWAY,
            ExitCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, code: err.exit_code().as_str(), message: err.to_string() }
    }
}

impl From<db::DbError> for ApiError {
    fn from(err: db::DbError) -> Self {
        match err {
            db::DbError::NotFound => Self::not_found("not found"),
            db::DbError::InvalidArgument(msg) => Self::bad_request(msg),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "code": self.code, "message": self.message }))).into_response()
    }
}
