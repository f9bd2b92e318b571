use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    api::AppState,
    error::AppResult,
    middleware::{read_cookie, set_cookie, Visitor},
    models::{SearchFilters, SearchHistoryEntry},
    routes::visitor_headers,
    services::search_history::{decode_cookie, encode_cookie, SEARCH_HISTORY_COOKIE},
};

#[derive(Debug, Deserialize)]
pub struct RecordSearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
}

/// An entry plus the key used to delete it
#[derive(Debug, Serialize)]
pub struct SearchHistoryItem {
    pub key: String,
    #[serde(flatten)]
    pub entry: SearchHistoryEntry,
}

fn items(entries: Vec<SearchHistoryEntry>) -> Vec<SearchHistoryItem> {
    entries
        .into_iter()
        .map(|entry| SearchHistoryItem {
            key: entry.key(),
            entry,
        })
        .collect()
}

fn cookie_entries(headers: &HeaderMap) -> Vec<SearchHistoryEntry> {
    read_cookie(headers, SEARCH_HISTORY_COOKIE)
        .map(|value| decode_cookie(&value))
        .unwrap_or_default()
}

/// Visitor cookie (if new) plus the rewritten history cookie
fn history_headers(
    state: &AppState,
    visitor: &Visitor,
    entries: &[SearchHistoryEntry],
) -> AppResult<HeaderMap> {
    let mut headers = visitor_headers(visitor);
    let max_age = state.config.search_history_cookie_days * 24 * 60 * 60;
    headers.append(
        SET_COOKIE,
        set_cookie(SEARCH_HISTORY_COOKIE, &encode_cookie(entries), max_age)?,
    );
    Ok(headers)
}

pub async fn list(
    State(state): State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
) -> Json<Vec<SearchHistoryItem>> {
    let entries = state
        .search_history
        .list(visitor.user_id, cookie_entries(&headers))
        .await;
    Json(items(entries))
}

pub async fn record(
    State(state): State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    Json(request): Json<RecordSearchRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<Vec<SearchHistoryItem>>)> {
    let entries = state
        .search_history
        .record(
            visitor.user_id,
            cookie_entries(&headers),
            &request.query,
            request.filters,
            Utc::now(),
        )
        .await?;

    let response_headers = history_headers(&state, &visitor, &entries)?;
    Ok((StatusCode::CREATED, response_headers, Json(items(entries))))
}

pub async fn remove(
    State(state): State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> AppResult<(HeaderMap, Json<Vec<SearchHistoryItem>>)> {
    let entries = state
        .search_history
        .remove(visitor.user_id, cookie_entries(&headers), &key)
        .await?;

    let response_headers = history_headers(&state, &visitor, &entries)?;
    Ok((response_headers, Json(items(entries))))
}

/// Drops the server copy and expires the cookie
pub async fn clear(
    State(state): State<AppState>,
    visitor: Visitor,
) -> AppResult<(StatusCode, HeaderMap)> {
    state.search_history.clear(visitor.user_id).await?;

    let mut headers = visitor_headers(&visitor);
    headers.append(SET_COOKIE, set_cookie(SEARCH_HISTORY_COOKIE, "", 0)?);
    Ok((StatusCode::NO_CONTENT, headers))
}
