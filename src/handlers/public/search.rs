use axum::extract::State;

use crate::middleware::{ApiResponse, ApiResult, QueryParams};
use crate::services::search_service::{SearchQuery, SearchResults};
use crate::state::AppState;

/// GET /api/search?q=&kind=all|posts|comments|users&category=&limit=
pub async fn search(State(state): State<AppState>, QueryParams(query): QueryParams<SearchQuery>) -> ApiResult<SearchResults> {
    let results = state.search().search(query).await?;
    Ok(ApiResponse::success(results))
}
