use axum::{extract::State, Extension};

use crate::auth::IssuedToken;
use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody};
use crate::services::auth_service::{UpdateProfile, WhoAmI};
use crate::state::AppState;

/// GET /api/auth/whoami
pub async fn whoami(State(state): State<AppState>, Extension(current): Extension<CurrentUser>) -> ApiResult<WhoAmI> {
    Ok(ApiResponse::success(state.auth().whoami(&current)))
}

/// POST /api/auth/refresh
pub async fn refresh(State(state): State<AppState>, Extension(current): Extension<CurrentUser>) -> ApiResult<IssuedToken> {
    Ok(ApiResponse::success(state.auth().refresh(&current)?))
}

/// PATCH /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<UpdateProfile>,
) -> ApiResult<User> {
    Ok(ApiResponse::success(state.auth().update_profile(&current, input).await?))
}
