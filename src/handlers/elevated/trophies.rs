use axum::{extract::State, Extension};

use crate::database::models::Trophy;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, PathParam};
use crate::services::trophy_service::{AwardOutcome, CreateTrophy};
use crate::state::AppState;

/// POST /api/trophies
pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<CreateTrophy>,
) -> ApiResult<Trophy> {
    Ok(ApiResponse::created(state.trophies().create(&current, input).await?))
}

/// DELETE /api/trophies/:slug
pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(slug): PathParam<String>,
) -> ApiResult<()> {
    state.trophies().delete(&current, &slug).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/trophies/:slug/award/:username
pub async fn award(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam((slug, username)): PathParam<(String, String)>,
) -> ApiResult<AwardOutcome> {
    Ok(ApiResponse::success(state.trophies().award(&current, &slug, &username).await?))
}

/// DELETE /api/trophies/:slug/award/:username
pub async fn revoke(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam((slug, username)): PathParam<(String, String)>,
) -> ApiResult<()> {
    state.trophies().revoke(&current, &slug, &username).await?;
    Ok(ApiResponse::no_content())
}
