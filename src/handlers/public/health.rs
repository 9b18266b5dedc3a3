use axum::extract::State;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET / - service description
pub async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "Forum API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth/* (register and login public, the rest protected)",
            "browse": "/api/categories, /api/posts, /api/trophies, /api/users/:username (public)",
            "search": "/api/search?q= (public)",
            "messages": "/api/messages/* (protected)",
            "notifications": "/api/notifications/* (protected, SSE at /api/notifications/stream)",
            "moderation": "/api/moderation/* (moderation permissions)",
            "admin": "/api/admin/* (admin permissions)",
        }
    })))
}

/// GET /health - 503 while the database is unreachable
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    if let Err(e) = state.db.health_check().await {
        tracing::warn!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable("Database unavailable"));
    }
    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "database": "ok",
    })))
}
