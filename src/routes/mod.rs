pub mod api;
pub mod ws;

use axum::{Router, routing::get};
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Listings
        .route("/api/v1/namespaces", get(api::handle_list_namespaces))
        .route("/api/v1/pods", get(api::handle_list_pods))
        .route(
            "/api/v1/workloads/{kind}/{namespace}",
            get(api::handle_list_workloads),
        )
        // One-shot positioned graph
        .route(
            "/api/v1/topology/{kind}/{namespace}/{name}",
            get(api::handle_get_topology),
        )
        // Live streams
        .route(
            "/api/v1/watch/{kind}/{namespace}/{name}",
            get(ws::handle_watch),
        )
        .route("/api/v1/watch/pods", get(ws::handle_watch_pods))
        // Health and status
        .route("/healthz", get(api::handle_healthz))
        .route("/api/v1/status", get(api::handle_status))
        // Renderer assets
        .nest_service("/ui", ServeDir::new("static"))
        // Root redirect
        .route("/", get(|| async { axum::response::Redirect::to("/ui/") }))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}
