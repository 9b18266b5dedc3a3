use axum::{extract::State, Extension};

use crate::database::models::Category;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, PathParam};
use crate::services::category_service::{CreateCategory, UpdateCategory};
use crate::state::AppState;

/// POST /api/categories
pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<CreateCategory>,
) -> ApiResult<Category> {
    Ok(ApiResponse::created(state.categories().create(&current, input).await?))
}

/// PATCH /api/categories/:slug
pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(slug): PathParam<String>,
    JsonBody(input): JsonBody<UpdateCategory>,
) -> ApiResult<Category> {
    Ok(ApiResponse::success(state.categories().update(&current, &slug, input).await?))
}

/// DELETE /api/categories/:slug
pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(slug): PathParam<String>,
) -> ApiResult<()> {
    state.categories().delete(&current, &slug).await?;
    Ok(ApiResponse::no_content())
}
