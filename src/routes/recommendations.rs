use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::AppState,
    error::AppResult,
    middleware::Visitor,
    models::{BlogPost, Property, Recommendations, Recommended},
    services::preferences::{BlogPreferences, PropertyPreferences},
};

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub properties: Option<usize>,
    pub posts: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub properties: PropertyPreferences,
    pub blog: BlogPreferences,
}

pub async fn properties(
    State(state): State<AppState>,
    visitor: Visitor,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<Recommended<Property>>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let picked = state
        .recommendations
        .personalized_properties(visitor.user_id, limit)
        .await?;
    Ok(Json(picked))
}

pub async fn blog_posts(
    State(state): State<AppState>,
    visitor: Visitor,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<Recommended<BlogPost>>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let picked = state
        .recommendations
        .personalized_blog_posts(visitor.user_id, limit)
        .await?;
    Ok(Json(picked))
}

/// Listings and posts in one response
pub async fn feed(
    State(state): State<AppState>,
    visitor: Visitor,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Recommendations>> {
    let feed = state
        .recommendations
        .personalized_recommendations(
            visitor.user_id,
            query.properties.unwrap_or(DEFAULT_LIMIT),
            query.posts.unwrap_or(DEFAULT_LIMIT),
        )
        .await?;
    Ok(Json(feed))
}

/// What the aggregation currently infers for the signed-in caller
pub async fn preferences(
    State(state): State<AppState>,
    visitor: Visitor,
) -> AppResult<Json<PreferencesResponse>> {
    let user_id = visitor.require_user()?;
    let (properties, blog) = tokio::try_join!(
        state.recommendations.property_preferences(user_id),
        state.recommendations.blog_preferences(user_id),
    )?;
    Ok(Json(PreferencesResponse { properties, blog }))
}
