// src/handlers/driver_handler.rs
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::{
    errors::HaulageError as AppError,
    models::{
        actor::Actor,
        driver::{DriverAvailabilityUpdate, DriverLocationUpdate, DriverRegistration, DriverResponse, PinLogin},
    },
    services::driver_service::DriverOperations,
    state::AppState,
};

pub async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(registration): Json<DriverRegistration>,
) -> Result<(StatusCode, Json<DriverResponse>), AppError> {
    let driver = state.driver_service.register_driver(registration).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(login): Json<PinLogin>,
) -> Result<Json<DriverResponse>, AppError> {
    Ok(Json(state.driver_service.authenticate(login).await?))
}

pub async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<DriverResponse>, AppError> {
    state
        .driver_service
        .get_driver(&driver_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::driver_not_found(driver_id))
}

pub async fn list_available_drivers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DriverResponse>>, AppError> {
    Ok(Json(state.driver_service.list_available_drivers().await?))
}

pub async fn verify_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(driver_id): Path<String>,
) -> Result<Json<DriverResponse>, AppError> {
    Ok(Json(state.driver_service.verify_driver(&actor, &driver_id).await?))
}

pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(driver_id): Path<String>,
    Json(update): Json<DriverAvailabilityUpdate>,
) -> Result<Json<DriverResponse>, AppError> {
    Ok(Json(state.driver_service.set_availability(&actor, &driver_id, update).await?))
}

pub async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(driver_id): Path<String>,
    Json(update): Json<DriverLocationUpdate>,
) -> Result<Json<DriverResponse>, AppError> {
    Ok(Json(state.driver_service.update_location(&actor, &driver_id, update).await?))
}
