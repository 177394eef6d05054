use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::image::{
    DeleteImageResponse, ErrorResponse, GenerateImageRequest, ListImagesParams,
};
use crate::models::job::Job;
use crate::services::lifecycle::JobError;
use crate::services::listing::ListQuery;

/// Error returned by the image endpoints, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Job(JobError),
    /// The request could not be extracted (body, path or query string).
    BadRequest(String),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        Self::Job(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(format!("Invalid image ID: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(format!("Invalid query: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Job(err) => {
                let status = match &err {
                    JobError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    JobError::NotFound(_) => StatusCode::NOT_FOUND,
                    JobError::StoreUnavailable(e) => {
                        tracing::error!(error = %e, "Job store unavailable");
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, err.to_string())
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// POST /api/images/generate — Submit a prompt; returns the pending job.
pub async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|report| JobError::InvalidArgument(report.to_string()))?;

    let job = state.jobs.submit(&request.prompt).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/images — All jobs, newest first.
pub async fn list_images(
    State(state): State<AppState>,
    params: Result<Query<ListImagesParams>, QueryRejection>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let Query(params) = params?;
    let query = ListQuery {
        status: params.status,
        limit: params.limit,
    };
    Ok(Json(state.listing.list_filtered(&query).await?))
}

/// GET /api/images/{id} — A single job, for status polling.
pub async fn get_image(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Job>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.jobs.get(id).await?))
}

/// DELETE /api/images/{id}
pub async fn delete_image(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeleteImageResponse>, ApiError> {
    let Path(id) = id?;
    state.jobs.delete(id).await?;
    Ok(Json(DeleteImageResponse {
        message: "Image deleted successfully".to_string(),
    }))
}
