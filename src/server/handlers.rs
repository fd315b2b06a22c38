use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::AppResult;
use crate::error::GenError;
use crate::model::{GenerationRequest, GenerationResult};
use crate::persistence::JobStatus;
use crate::retry::{DEFAULT_MAX_RETRIES, RetryReport};

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

#[derive(Debug, Deserialize)]
pub struct RetryByTitleBody {
    pub title: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize)]
pub struct RetryResultBody {
    pub previous_result: GenerationResult,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Body of the status lookup.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub title: String,
    pub total_sets: u32,
    pub successful_sets: u32,
    pub failed_count: u32,
    pub failed_sets: Vec<u32>,
    pub existing_sets: Vec<u32>,
    pub missing_sets: Vec<u32>,
    pub is_complete: bool,
}

impl From<JobStatus> for StatusResponse {
    fn from(status: JobStatus) -> Self {
        Self {
            success: status.exists,
            total_sets: status.total_sets_expected.unwrap_or(0),
            successful_sets: status.existing_sets.len() as u32,
            failed_count: (status.failed_sets.len() + status.missing_sets.len()) as u32,
            title: status.title,
            failed_sets: status.failed_sets,
            existing_sets: status.existing_sets,
            missing_sets: status.missing_sets,
            is_complete: status.is_complete,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/v1/generations
pub async fn create_generation(
    State(state): State<AppState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<GenerationResult>>> {
    let Json(request) = body?;
    let result = state.service.generate(request).await?;
    Ok(Json(DataResponse { data: result }))
}

/// POST /api/v1/generations/retry
pub async fn retry_by_title(
    State(state): State<AppState>,
    body: Result<Json<RetryByTitleBody>, JsonRejection>,
) -> AppResult<Json<DataResponse<RetryReport>>> {
    let Json(body) = body?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err(GenError::InvalidInput("title must not be empty".into()).into());
    }
    let report = state.service.retry_by_title(title, body.max_retries).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/generations/retry-result
pub async fn retry_with_result(
    State(state): State<AppState>,
    body: Result<Json<RetryResultBody>, JsonRejection>,
) -> AppResult<Json<DataResponse<RetryReport>>> {
    let Json(body) = body?;
    let report = state
        .service
        .retry_with_result(body.previous_result, body.max_retries)
        .await?;
    Ok(Json(DataResponse { data: report }))
}

/// GET /api/v1/generations/{title}/status
pub async fn generation_status(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> AppResult<Json<DataResponse<StatusResponse>>> {
    let status = state.service.status(&title).await?;
    if !status.exists {
        return Err(GenError::NotFound(format!("generation \"{}\"", title)).into());
    }
    Ok(Json(DataResponse {
        data: status.into(),
    }))
}

/// GET /api/v1/generations/{title}
pub async fn get_generation(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> AppResult<Json<DataResponse<GenerationResult>>> {
    let result = state.service.load(&title).await?;
    Ok(Json(DataResponse { data: result }))
}

/// DELETE /api/v1/generations/{title}
pub async fn delete_generation(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> AppResult<Json<DataResponse<DeleteResponse>>> {
    let deleted = state.service.delete(&title).await?;
    Ok(Json(DataResponse {
        data: DeleteResponse { deleted },
    }))
}
