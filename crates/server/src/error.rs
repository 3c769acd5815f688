use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use blueprint_core::{CoreError, StoreError};
use orchestrator::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
    Database(db::DbError),
    Store(StoreError),
    Engine(OrchestratorError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error occurred".to_string(),
                )
            }
            AppError::Store(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_error",
                    err.to_string(),
                )
            }
            AppError::Engine(err) => match err {
                OrchestratorError::TemplateNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Template not found: {}", id),
                ),
                OrchestratorError::TriggerNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Trigger not found: {}", id),
                ),
                OrchestratorError::Core(CoreError::Validation(msg)) => {
                    (StatusCode::BAD_REQUEST, "bad_request", msg)
                }
                other => {
                    tracing::error!("Engine error: {:?}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "engine_error",
                        other.to_string(),
                    )
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Engine(err)
    }
}
