use axum::{extract::State, Extension};

use crate::database::models::Report;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody};
use crate::services::moderation_service::FileReport;
use crate::state::AppState;

/// POST /api/reports
pub async fn file(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<FileReport>,
) -> ApiResult<Report> {
    Ok(ApiResponse::created(state.moderation().file_report(&current, input).await?))
}
