use axum::{extract::State, Extension};
use uuid::Uuid;

use crate::database::models::Post;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, PathParam};
use crate::services::post_service::{CreatePost, LikeState, UpdatePost};
use crate::state::AppState;

/// POST /api/posts
pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<CreatePost>,
) -> ApiResult<Post> {
    Ok(ApiResponse::created(state.posts().create(&current, input).await?))
}

/// PATCH /api/posts/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(input): JsonBody<UpdatePost>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(state.posts().update(&current, id, input).await?))
}

/// DELETE /api/posts/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<()> {
    state.posts().delete(&current, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/posts/:id/like
pub async fn like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<LikeState> {
    Ok(ApiResponse::success(state.posts().like(&current, id).await?))
}

/// DELETE /api/posts/:id/like
pub async fn unlike(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<LikeState> {
    Ok(ApiResponse::success(state.posts().unlike(&current, id).await?))
}
