pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod notifications;
pub mod observer;
pub mod permissions;
pub mod services;
pub mod state;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::config::config;
use crate::middleware::{jwt_auth_middleware, validate_user_middleware};
use crate::state::AppState;

/// Install the global tracing subscriber; `RUST_LOG` overrides the default level
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Build the full HTTP application around shared state
pub fn app(state: AppState) -> Router {
    let config = config();

    let authenticated = Router::new()
        .merge(account_routes())
        .merge(content_routes())
        .merge(message_routes())
        .merge(notification_routes())
        .merge(moderation_routes())
        .merge(catalogue_routes())
        .merge(admin_routes())
        // Layers run bottom-up: the token is checked before the user is loaded
        .route_layer(from_fn_with_state(state.clone(), validate_user_middleware))
        .route_layer(from_fn(jwt_auth_middleware));

    let mut router = Router::new()
        .merge(public_routes())
        .merge(authenticated)
        .fallback(handlers::not_found)
        .layer(cors_layer(&config.security.cors_origins))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes));

    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(allowed)
}

fn public_routes() -> Router<AppState> {
    use handlers::public::{auth, browse, health, search};

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        // Token acquisition
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        // Read-only browsing
        .route("/api/categories", get(browse::list_categories))
        .route("/api/categories/:slug", get(browse::get_category))
        .route("/api/posts", get(browse::list_posts))
        .route("/api/posts/find", post(browse::find_posts))
        .route("/api/posts/:id", get(browse::get_post))
        .route("/api/posts/:id/comments", get(browse::list_comments))
        .route("/api/trophies", get(browse::list_trophies))
        .route("/api/users/:username", get(browse::user_profile))
        .route("/api/users/:username/trophies", get(browse::user_trophies))
        .route("/api/search", get(search::search))
}

fn account_routes() -> Router<AppState> {
    use axum::routing::patch;
    use handlers::protected::account;

    Router::new()
        .route("/api/auth/whoami", get(account::whoami))
        .route("/api/auth/refresh", post(account::refresh))
        .route("/api/auth/profile", patch(account::update_profile))
}

fn content_routes() -> Router<AppState> {
    use axum::routing::patch;
    use handlers::protected::{comments, posts, reports};

    Router::new()
        .route("/api/posts", post(posts::create))
        .route("/api/posts/:id", patch(posts::update).delete(posts::delete))
        .route("/api/posts/:id/like", post(posts::like).delete(posts::unlike))
        .route("/api/posts/:id/comments", post(comments::create))
        .route("/api/comments/:id", patch(comments::update).delete(comments::delete))
        .route("/api/reports", post(reports::file))
}

fn message_routes() -> Router<AppState> {
    use axum::routing::delete;
    use handlers::protected::messages;

    Router::new()
        .route("/api/messages", post(messages::send))
        .route("/api/messages/inbox", get(messages::inbox))
        .route("/api/messages/sent", get(messages::sent))
        .route("/api/messages/unread", get(messages::unread_count))
        .route("/api/messages/with/:username", get(messages::conversation))
        .route("/api/messages/:id", delete(messages::delete))
        .route("/api/messages/:id/read", post(messages::mark_read))
}

fn notification_routes() -> Router<AppState> {
    use handlers::protected::notifications;

    Router::new()
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/unread", get(notifications::unread_count))
        .route("/api/notifications/stream", get(notifications::stream))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/:id/read", post(notifications::mark_read))
}

fn moderation_routes() -> Router<AppState> {
    use handlers::elevated::moderation;

    Router::new()
        .route("/api/moderation/reports", get(moderation::list_reports))
        .route("/api/moderation/reports/:id/resolve", post(moderation::resolve_report))
        .route(
            "/api/moderation/users/:username/ban",
            post(moderation::ban).delete(moderation::unban),
        )
        .route("/api/moderation/remove", post(moderation::remove_content))
        .route("/api/moderation/posts/:id/pin", post(moderation::pin).delete(moderation::unpin))
        .route("/api/moderation/posts/:id/lock", post(moderation::lock).delete(moderation::unlock))
        .route("/api/moderation/log", get(moderation::audit_log))
}

fn catalogue_routes() -> Router<AppState> {
    use axum::routing::{delete, patch};
    use handlers::elevated::{categories, trophies};

    Router::new()
        .route("/api/categories", post(categories::create))
        .route("/api/categories/:slug", patch(categories::update).delete(categories::delete))
        .route("/api/trophies", post(trophies::create))
        .route("/api/trophies/:slug", delete(trophies::delete))
        .route(
            "/api/trophies/:slug/award/:username",
            post(trophies::award).delete(trophies::revoke),
        )
}

fn admin_routes() -> Router<AppState> {
    use axum::routing::{delete, put};
    use handlers::elevated::admin;

    Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:username/access", get(admin::user_access))
        .route("/api/admin/users/:username/primary-role", put(admin::set_primary_role))
        .route("/api/admin/users/:username/roles", put(admin::set_secondary_roles))
        .route("/api/admin/roles", get(admin::list_roles).post(admin::create_role))
        .route("/api/admin/roles/:name", delete(admin::delete_role))
        .route(
            "/api/admin/roles/:name/permissions/:permission",
            post(admin::grant).delete(admin::revoke),
        )
        .route("/api/admin/permissions", get(admin::list_permissions).post(admin::create_permission))
        .route("/api/admin/stats", get(admin::stats))
}
