//! Router configuration for the web server.

use std::sync::LazyLock;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use regex::Regex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::handlers;
use super::AppState;

/// Local development and preview deployments are always allowed.
static DEV_ORIGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://(localhost|127\.0\.0\.1)(:\d+)?|https://.*\.vercel\.app)$").unwrap()
});

/// Headroom for multipart framing on top of the file size limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

fn origin_allowed(origin: &HeaderValue, allowed: &[String]) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    allowed.iter().any(|o| o == origin) || DEV_ORIGIN.is_match(origin)
}

fn cors_layer(allowed: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin_allowed(origin, &allowed)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = match state.settings.max_file_size_bytes() {
        Some(limit) => DefaultBodyLimit::max(limit as usize + FORM_OVERHEAD_BYTES),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/upload", post(handlers::upload))
        .route("/api/status/:submission_id", get(handlers::submission_status))
        .route("/files/*path", get(handlers::serve_file))
        .layer(body_limit)
        .layer(cors_layer(state.settings.cors_origins.clone()))
        .with_state(state)
}
