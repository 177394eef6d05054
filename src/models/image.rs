use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::JobStatus;

/// Request body for `POST /api/images/generate`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateImageRequest {
    #[garde(length(min = 1))]
    pub prompt: String,
}

/// Query string accepted by `GET /api/images`.
#[derive(Debug, Default, Deserialize)]
pub struct ListImagesParams {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
