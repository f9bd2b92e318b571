use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    api::AppState,
    middleware::{visitor_cookie, Visitor},
};

pub mod admin;
pub mod catalog;
pub mod experiments;
pub mod notifications;
pub mod recommendations;
pub mod search_history;

/// Business routes, nested under `/api/v1`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/properties", post(catalog::create_property))
        .route("/properties/:id", get(catalog::get_property))
        .route("/posts", post(catalog::create_post))
        .route("/posts/:id", get(catalog::get_post))
        .route("/interactions", post(catalog::record_interaction))
        // Recommendations
        .route("/recommendations", get(recommendations::feed))
        .route("/recommendations/properties", get(recommendations::properties))
        .route("/recommendations/posts", get(recommendations::blog_posts))
        .route("/preferences", get(recommendations::preferences))
        // Search history
        .route(
            "/search-history",
            get(search_history::list)
                .post(search_history::record)
                .delete(search_history::clear),
        )
        .route("/search-history/:key", delete(search_history::remove))
        // Experiments
        .route("/experiments", post(experiments::create))
        .route("/experiments/:name/assign", post(experiments::assign))
        .route("/experiments/:name/events", post(experiments::record_event))
        .route("/experiments/:name/stats", get(experiments::stats))
        .route("/experiments/:name/active", put(experiments::set_active))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/:id/read", post(notifications::mark_read))
        // Admin
        .route("/admin/expiration/run", post(admin::run_expiration))
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Response headers carrying the visitor cookie when one was just minted
pub(crate) fn visitor_headers(visitor: &Visitor) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = visitor_cookie(visitor) {
        headers.append(SET_COOKIE, cookie);
    }
    headers
}
