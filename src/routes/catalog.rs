use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::AppState,
    error::AppResult,
    middleware::Visitor,
    models::{
        BlogPost, EntityKind, EntityRef, Interaction, InteractionKind, NewBlogPost, NewProperty,
        Property,
    },
};

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub kind: InteractionKind,
}

pub async fn create_property(
    State(state): State<AppState>,
    Json(request): Json<NewProperty>,
) -> AppResult<(StatusCode, Json<Property>)> {
    let property = state.catalog.create_property(request).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn get_property(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Property>> {
    let property = state.catalog.get_property(id, visitor.user_id).await?;
    Ok(Json(property))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(request): Json<NewBlogPost>,
) -> AppResult<(StatusCode, Json<BlogPost>)> {
    let post = state.catalog.create_post(request).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BlogPost>> {
    let post = state.catalog.get_post(id, visitor.user_id).await?;
    Ok(Json(post))
}

/// Explicit like/save/view; signed-in callers only
pub async fn record_interaction(
    State(state): State<AppState>,
    visitor: Visitor,
    Json(request): Json<InteractionRequest>,
) -> AppResult<(StatusCode, Json<Interaction>)> {
    let user_id = visitor.require_user()?;
    let entity = EntityRef {
        kind: request.entity_kind,
        id: request.entity_id,
    };
    let interaction = state
        .catalog
        .record_interaction(user_id, entity, request.kind)
        .await?;
    Ok((StatusCode::CREATED, Json(interaction)))
}
