use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::AppState,
    error::AppResult,
    middleware::Visitor,
    models::{EventKind, Experiment, ExperimentEvent, Variant, VariantAssignment, VariantStats},
    routes::visitor_headers,
};

#[derive(Debug, Deserialize)]
pub struct CreateExperimentRequest {
    pub name: String,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub kind: EventKind,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub experiment: String,
    pub variants: Vec<VariantStats>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateExperimentRequest>,
) -> AppResult<(StatusCode, Json<Experiment>)> {
    let experiment = state
        .experiments
        .create_experiment(&request.name, request.variants)
        .await?;
    Ok((StatusCode::CREATED, Json(experiment)))
}

/// Sticky per `visitor_id` cookie
pub async fn assign(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(name): Path<String>,
) -> AppResult<(HeaderMap, Json<VariantAssignment>)> {
    let assignment = state.experiments.assign(&name, visitor.client_id).await?;
    Ok((visitor_headers(&visitor), Json(assignment)))
}

pub async fn record_event(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(name): Path<String>,
    Json(request): Json<EventRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<ExperimentEvent>)> {
    let event = state
        .experiments
        .record_event(&name, visitor.client_id, request.kind)
        .await?;
    Ok((StatusCode::CREATED, visitor_headers(&visitor), Json(event)))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<StatsResponse>> {
    let variants = state.experiments.stats(&name).await?;
    Ok(Json(StatsResponse {
        experiment: name,
        variants,
    }))
}

pub async fn set_active(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ActiveRequest>,
) -> AppResult<StatusCode> {
    state.experiments.set_active(&name, request.active).await?;
    Ok(StatusCode::NO_CONTENT)
}
