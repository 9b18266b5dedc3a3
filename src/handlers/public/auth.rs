use axum::extract::State;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::auth_service::{AuthSession, LoginRequest, RegisterRequest};
use crate::state::AppState;

/// POST /api/auth/register
pub async fn register(State(state): State<AppState>, JsonBody(input): JsonBody<RegisterRequest>) -> ApiResult<AuthSession> {
    let session = state.auth().register(input).await?;
    Ok(ApiResponse::created(session))
}

/// POST /api/auth/login
pub async fn login(State(state): State<AppState>, JsonBody(input): JsonBody<LoginRequest>) -> ApiResult<AuthSession> {
    let session = state.auth().login(input).await?;
    Ok(ApiResponse::success(session))
}
