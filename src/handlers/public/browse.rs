// Read-only endpoints open to anonymous visitors

use axum::extract::State;
use uuid::Uuid;

use crate::database::models::{AwardedTrophy, Category, PostSummary, Trophy};
use crate::database::Page;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, JsonBody, ListQuery, PathParam, QueryParams};
use crate::services::admin_service::ProfileView;
use crate::services::comment_service::CommentNode;
use crate::services::post_service::PostListQuery;
use crate::state::AppState;

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    Ok(ApiResponse::success(state.categories().list().await?))
}

/// GET /api/categories/:slug
pub async fn get_category(State(state): State<AppState>, PathParam(slug): PathParam<String>) -> ApiResult<Category> {
    Ok(ApiResponse::success(state.categories().by_slug(&slug).await?))
}

/// GET /api/posts?category=&author=&limit=&offset=&order=&where=
pub async fn list_posts(
    State(state): State<AppState>,
    QueryParams(scope): QueryParams<PostListQuery>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<PostSummary>> {
    let page = state.posts().list(&scope, list.into_filter()?).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/posts/find - filter document in the body
pub async fn find_posts(
    State(state): State<AppState>,
    QueryParams(scope): QueryParams<PostListQuery>,
    JsonBody(filter): JsonBody<FilterData>,
) -> ApiResult<Page<PostSummary>> {
    let page = state.posts().list(&scope, filter).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/posts/:id - counts a view
pub async fn get_post(State(state): State<AppState>, PathParam(id): PathParam<Uuid>) -> ApiResult<PostSummary> {
    Ok(ApiResponse::success(state.posts().view(id).await?))
}

/// GET /api/posts/:id/comments - threaded
pub async fn list_comments(State(state): State<AppState>, PathParam(id): PathParam<Uuid>) -> ApiResult<Vec<CommentNode>> {
    Ok(ApiResponse::success(state.comments().list_for_post(id).await?))
}

/// GET /api/trophies
pub async fn list_trophies(State(state): State<AppState>) -> ApiResult<Vec<Trophy>> {
    Ok(ApiResponse::success(state.trophies().list().await?))
}

/// GET /api/users/:username
pub async fn user_profile(State(state): State<AppState>, PathParam(username): PathParam<String>) -> ApiResult<ProfileView> {
    Ok(ApiResponse::success(state.admin().profile(&username).await?))
}

/// GET /api/users/:username/trophies
pub async fn user_trophies(
    State(state): State<AppState>,
    PathParam(username): PathParam<String>,
) -> ApiResult<Vec<AwardedTrophy>> {
    Ok(ApiResponse::success(state.trophies().for_user(&username).await?))
}
