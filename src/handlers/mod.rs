// src/handlers/mod.rs
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{HeaderMap, request::Parts},
    routing::{get, post, put},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{errors::HaulageError as AppError, models::actor::Actor, state::AppState};

pub mod cooperative_handler;
pub mod driver_handler;
pub mod trip_handler;

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Reads the acting party from `x-actor-role` / `x-actor-id`.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))
    };

    let role = header(ACTOR_ROLE_HEADER)?;
    let id = header(ACTOR_ID_HEADER)?;
    Actor::parse(&role, &id).ok_or_else(|| AppError::Unauthorized(format!("Unknown actor {}:{}", role, id)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let store_ok = state.store_service.health_check().await?;
    Ok(Json(json!({
        "status": "healthy",
        "store": store_ok,
    })))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Trips
        .route("/trips", get(trip_handler::list_trips).post(trip_handler::create_trip))
        .route("/trips/open", get(trip_handler::list_open_trips))
        .route("/trips/estimate", post(trip_handler::estimate))
        .route("/trips/:id", get(trip_handler::get_trip))
        .route("/trips/:id/pricing", put(trip_handler::reprice))
        .route("/trips/:id/accept", post(trip_handler::accept_trip))
        .route("/trips/:id/reject", post(trip_handler::reject_trip))
        .route("/trips/:id/pickup", post(trip_handler::confirm_pickup))
        .route("/trips/:id/delivery", post(trip_handler::confirm_delivery))
        .route("/trips/:id/dispute", post(trip_handler::raise_dispute))
        .route("/trips/:id/dispute/resolve", post(trip_handler::resolve_dispute))
        // Drivers
        .route("/drivers", post(driver_handler::register_driver))
        .route("/drivers/login", post(driver_handler::login))
        .route("/drivers/available", get(driver_handler::list_available_drivers))
        .route("/drivers/:id", get(driver_handler::get_driver))
        .route("/drivers/:id/verify", post(driver_handler::verify_driver))
        .route("/drivers/:id/availability", put(driver_handler::set_availability))
        .route("/drivers/:id/location", put(driver_handler::update_location))
        // Cooperatives and farmers
        .route("/cooperatives", post(cooperative_handler::register_cooperative))
        .route("/cooperatives/login", post(cooperative_handler::login))
        .route("/cooperatives/:id", get(cooperative_handler::get_cooperative))
        .route("/cooperatives/:id/verify", post(cooperative_handler::verify_cooperative))
        .route(
            "/cooperatives/:id/farmers",
            get(cooperative_handler::list_farmers).post(cooperative_handler::register_farmer),
        )
        .route("/farmers/:id", get(cooperative_handler::get_farmer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
