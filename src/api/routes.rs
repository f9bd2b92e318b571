use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::AppState;
use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    routes::{api_routes, health_check},
};

/// Creates the application router with all routes and layers
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            // Request id runs first so the trace span can pick it up
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
