// handlers/mod.rs - Three-tier handler layout
//
// Public (no token) -> Protected (bearer token + active user) -> Elevated
// (protected, plus moderation or admin permissions checked per operation).
// Handlers stay thin: extract, call a service, wrap the result.

pub mod elevated;
pub mod protected;
pub mod public;

use crate::error::ApiError;

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
