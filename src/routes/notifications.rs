use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{api::AppState, error::AppResult, middleware::Visitor, models::Notification};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list(
    State(state): State<AppState>,
    visitor: Visitor,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let user_id = visitor.require_user()?;
    let notifications = state.notifications.list(user_id, query.unread).await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user_id = visitor.require_user()?;
    state.notifications.mark_read(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
