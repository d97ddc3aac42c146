//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Capability discovery
        .route("/v1/capabilities", get(handlers::get_capabilities))
        // Health check (intentionally unauthenticated; doubles as the
        // client's liveness probe during chunk retry)
        .route("/v1/health", get(handlers::health_check))
        // Bundle upload control plane
        .route("/v1/bundles/{bundle_id}", get(handlers::get_bundle))
        .route(
            "/v1/bundles/{bundle_id}/chunks",
            get(handlers::chunk_status),
        )
        .route(
            "/v1/bundles/{bundle_id}/chunks/{index}",
            put(handlers::upload_chunk),
        )
        .route(
            "/v1/bundles/{bundle_id}/process",
            post(handlers::trigger_process),
        );

    let mut router = Router::new().merge(api_routes);

    // Conditionally add the metrics endpoint based on config. When enabled,
    // restrict it to authorized scraper IPs at the infrastructure level.
    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
