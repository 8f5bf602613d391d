// src/handlers/cooperative_handler.rs
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
        cooperative::{CooperativeRegistration, CooperativeResponse, Farmer, FarmerRegistration},
        driver::PinLogin,
    },
    services::cooperative_service::CooperativeOperations,
    state::AppState,
};

pub async fn register_cooperative(
    State(state): State<Arc<AppState>>,
    Json(registration): Json<CooperativeRegistration>,
) -> Result<(StatusCode, Json<CooperativeResponse>), AppError> {
    let cooperative = state.cooperative_service.register_cooperative(registration).await?;
    Ok((StatusCode::CREATED, Json(cooperative)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(login): Json<PinLogin>,
) -> Result<Json<CooperativeResponse>, AppError> {
    Ok(Json(state.cooperative_service.authenticate(login).await?))
}

pub async fn get_cooperative(
    State(state): State<Arc<AppState>>,
    Path(cooperative_id): Path<String>,
) -> Result<Json<CooperativeResponse>, AppError> {
    state
        .cooperative_service
        .get_cooperative(&cooperative_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::cooperative_not_found(cooperative_id))
}

pub async fn verify_cooperative(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(cooperative_id): Path<String>,
) -> Result<Json<CooperativeResponse>, AppError> {
    Ok(Json(state.cooperative_service.verify_cooperative(&actor, &cooperative_id).await?))
}

pub async fn register_farmer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(cooperative_id): Path<String>,
    Json(registration): Json<FarmerRegistration>,
) -> Result<(StatusCode, Json<Farmer>), AppError> {
    let farmer = state
        .cooperative_service
        .register_farmer(&actor, &cooperative_id, registration)
        .await?;
    Ok((StatusCode::CREATED, Json(farmer)))
}

pub async fn list_farmers(
    State(state): State<Arc<AppState>>,
    Path(cooperative_id): Path<String>,
) -> Result<Json<Vec<Farmer>>, AppError> {
    Ok(Json(state.cooperative_service.list_farmers(&cooperative_id).await?))
}

pub async fn get_farmer(
    State(state): State<Arc<AppState>>,
    Path(farmer_id): Path<String>,
) -> Result<Json<Farmer>, AppError> {
    state
        .cooperative_service
        .get_farmer(&farmer_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::farmer_not_found(farmer_id))
}
