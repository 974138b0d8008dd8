//! Route configuration.

use crate::access_log::access_log_middleware;
use crate::gate::auth_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers/probes)
        .route("/v1/health", get(handlers::health_check))
        // Account endpoints
        .route("/v1/auth/register", post(handlers::register))
        .route("/v1/auth/login", post(handlers::login))
        // Package endpoints
        .route(
            "/v1/packages",
            post(handlers::upload_package).get(handlers::list_packages),
        )
        .route("/v1/packages/bulk", post(handlers::bulk_upload))
        .route(
            "/v1/packages/{package_id}/versions",
            get(handlers::list_versions),
        )
        .route(
            "/v1/packages/{package_id}/rollback",
            post(handlers::rollback_package),
        )
        .route(
            "/v1/packages/{package_id}/download",
            get(handlers::download_package),
        )
        .route(
            "/v1/packages/{package_id}",
            delete(handlers::delete_package),
        )
        // Analytics (admin only, enforced in the handler)
        .route("/v1/analytics/downloads", get(handlers::list_downloads));

    // External routes carry an access-log layer. Route layers run after
    // router layers on the request path, so the auth extension is already
    // set when the log middleware captures the caller.
    let external_routes = Router::new()
        .route(
            "/v1/external/packages",
            get(handlers::external::list_packages),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            access_log_middleware,
        ));

    // Allow headroom over the package limit for multipart framing
    let body_limit = state.config.server.max_upload_bytes as usize + 1024 * 1024;

    // Middleware layers are applied in reverse order (outermost first).
    // Order of execution: TraceLayer -> body limit -> auth -> handler
    Router::new()
        .merge(api_routes)
        .merge(external_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
