// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: Main router assembly and middleware
// - tokens.rs: Submission token issuance
// - messages.rs: Submit, list, delete
// - health.rs: Health check and metrics endpoints
// - extractors.rs: Client context extraction
// - middleware.rs: Request logging, security headers
//
// ============================================================================

mod extractors;
mod health;
mod messages;
mod middleware;
mod tokens;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub use extractors::RequestClient;

/// Create the main application router with all routes
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    let security = &app_context.config.security;

    let mut router = Router::new()
        // Health and monitoring
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Token protocol
        .route("/api/token", get(tokens::issue_token))
        .route(
            "/api/messages",
            get(messages::list_messages).post(messages::submit_message),
        )
        .route("/api/messages/:id", delete(messages::delete_message));

    if let Some(static_dir) = &app_context.config.static_dir {
        tracing::info!(static_dir = %static_dir, "Serving static files");
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    router
        .layer(DefaultBodyLimit::max(security.max_request_body_bytes))
        .layer(cors_layer(&security.cors_allowed_origins))
        // Apply middleware (order matters - last added runs first)
        .layer(
            ServiceBuilder::new()
                // Tracing layer (outermost - runs first)
                .layer(TraceLayer::new_for_http())
                // Request logging
                .layer(axum::middleware::from_fn(middleware::request_logging))
                // Security headers
                .layer(axum::middleware::from_fn(middleware::add_security_headers))
                .into_inner(),
        )
        .with_state(app_context)
}

/// CORS limited to the configured origins. Without any, no cross-origin
/// access is granted.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
}
