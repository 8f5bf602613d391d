// src/handlers/trip_handler.rs
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::{
    errors::HaulageError as AppError,
    models::{
        actor::Actor,
        trip::{
            DisputeRequest, DisputeResolution, EvidenceSubmission, RejectionRequest, RepriceRequest, TripEstimate,
            TripEstimateRequest, TripFilter, TripRequest, TripResponse,
        },
    },
    services::trip_service::TripOperations,
    state::AppState,
};

pub async fn create_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<TripRequest>,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    let trip = state.trip_service.create_trip(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TripEstimateRequest>,
) -> Result<Json<TripEstimate>, AppError> {
    Ok(Json(state.trip_service.estimate(request).await?))
}

pub async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripResponse>, AppError> {
    state
        .trip_service
        .get_trip(&trip_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::trip_not_found(trip_id))
}

pub async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TripFilter>,
) -> Result<Json<Vec<TripResponse>>, AppError> {
    Ok(Json(state.trip_service.list_trips(filter).await?))
}

pub async fn list_open_trips(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TripResponse>>, AppError> {
    Ok(Json(state.trip_service.list_open_trips().await?))
}

pub async fn reprice(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
    Json(rates): Json<RepriceRequest>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.reprice(&actor, &trip_id, rates).await?))
}

pub async fn accept_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.accept_trip(&actor, &trip_id).await?))
}

pub async fn reject_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
    Json(request): Json<RejectionRequest>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.reject_trip(&actor, &trip_id, request).await?))
}

pub async fn confirm_pickup(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
    Json(submission): Json<EvidenceSubmission>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.confirm_pickup(&actor, &trip_id, submission).await?))
}

pub async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
    Json(submission): Json<EvidenceSubmission>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.confirm_delivery(&actor, &trip_id, submission).await?))
}

pub async fn raise_dispute(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
    Json(request): Json<DisputeRequest>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.raise_dispute(&actor, &trip_id, request).await?))
}

pub async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(trip_id): Path<String>,
    Json(resolution): Json<DisputeResolution>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.trip_service.resolve_dispute(&actor, &trip_id, resolution).await?))
}
