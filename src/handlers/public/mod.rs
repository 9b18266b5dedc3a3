// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition, health, read-only browsing and search.

pub mod auth;
pub mod browse;
pub mod health;
pub mod search;
