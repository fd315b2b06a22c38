use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::GenError;
use crate::service::ServiceError;

/// Error type for HTTP handlers. Every variant renders as
/// `{ "success": false, "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request body could not be read as the expected JSON.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<GenError> for AppError {
    fn from(err: GenError) -> Self {
        AppError::Service(ServiceError::Gen(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, result) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
            AppError::Service(ServiceError::Gen(err)) => match err {
                GenError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
                GenError::NotFound(what) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"), None)
                }
                GenError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
                GenError::Persistence(err) => {
                    tracing::error!(error = %err, "Persistence error");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "PERSISTENCE_ERROR",
                        err.to_string(),
                        None,
                    )
                }
            },
            AppError::Service(ServiceError::Unsaved { source, result }) => {
                tracing::error!(error = %source, title = %result.title, "Result computed but not saved");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PERSISTENCE_ERROR",
                    format!("result not saved: {source}"),
                    Some(result),
                )
            }
        };

        let mut body = json!({
            "success": false,
            "error": message,
            "code": code,
        });
        if let Some(result) = result {
            body["result"] = json!(result);
        }

        (status, axum::Json(body)).into_response()
    }
}
