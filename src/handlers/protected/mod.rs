// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Every route here runs behind jwt_auth_middleware and
// validate_user_middleware, so handlers receive a CurrentUser whose
// permissions were resolved for this request.

pub mod account;
pub mod comments;
pub mod messages;
pub mod notifications;
pub mod posts;
pub mod reports;
