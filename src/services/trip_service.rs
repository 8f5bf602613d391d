// src/services/trip_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing;

use crate::{
    errors::HaulageError as AppError,
    models::{
        actor::Actor,
        trip::{
            DisputeRequest, DisputeResolution, EvidenceSubmission, Location, LocationInput, Pricing, RejectionRequest,
            RepriceRequest, Trip, TripEstimate, TripEstimateRequest, TripFilter, TripRequest, TripResponse,
            TripStatus,
        },
    },
    services::{
        geocoding_service::{GeocodingService, resolve_location},
        lifecycle::{self, TransitionOutcome},
        messaging_service::NotificationService,
        pricing,
        store_service::{StoreKeys, StoreService},
    },
    utils::{
        id_generator::{IdGenerator, IdType},
        validation::Validator,
    },
};

pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.05;

#[async_trait]
pub trait TripOperations: Send + Sync {
    async fn create_trip(&self, actor: &Actor, request: TripRequest) -> Result<TripResponse, AppError>;
    async fn estimate(&self, request: TripEstimateRequest) -> Result<TripEstimate, AppError>;
    async fn reprice(&self, actor: &Actor, trip_id: &str, rates: RepriceRequest) -> Result<TripResponse, AppError>;
    async fn get_trip(&self, trip_id: &str) -> Result<Option<TripResponse>, AppError>;
    async fn list_trips(&self, filter: TripFilter) -> Result<Vec<TripResponse>, AppError>;
    async fn list_open_trips(&self) -> Result<Vec<TripResponse>, AppError>;
    async fn accept_trip(&self, actor: &Actor, trip_id: &str) -> Result<TripResponse, AppError>;
    async fn reject_trip(&self, actor: &Actor, trip_id: &str, request: RejectionRequest) -> Result<TripResponse, AppError>;
    async fn confirm_pickup(
        &self,
        actor: &Actor,
        trip_id: &str,
        submission: EvidenceSubmission,
    ) -> Result<TripResponse, AppError>;
    async fn confirm_delivery(
        &self,
        actor: &Actor,
        trip_id: &str,
        submission: EvidenceSubmission,
    ) -> Result<TripResponse, AppError>;
    async fn raise_dispute(&self, actor: &Actor, trip_id: &str, request: DisputeRequest) -> Result<TripResponse, AppError>;
    async fn resolve_dispute(
        &self,
        actor: &Actor,
        trip_id: &str,
        resolution: DisputeResolution,
    ) -> Result<TripResponse, AppError>;
}

pub struct TripService {
    store_service: Arc<StoreService>,
    geocoder: Arc<dyn GeocodingService>,
    notification_service: Arc<dyn NotificationService>,
    variance_threshold: f64,
    // One async lock per in-flight trip id; serializes transitions within this process
    trip_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TripService {
    pub fn new(
        store_service: Arc<StoreService>,
        geocoder: Arc<dyn GeocodingService>,
        notification_service: Arc<dyn NotificationService>,
        variance_threshold: f64,
    ) -> Self {
        Self {
            store_service,
            geocoder,
            notification_service,
            variance_threshold,
            trip_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn trip_lock(&self, trip_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.trip_locks.lock().await;
        locks.entry(trip_id.to_string()).or_default().clone()
    }

    /// Drops the map entry once no other caller holds or waits on it.
    async fn release_trip_lock(&self, trip_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.trip_locks.lock().await;
        // Clones are only handed out under the map lock: ours plus the map's means idle
        if Arc::strong_count(&lock) == 2 {
            locks.remove(trip_id);
        }
    }

    async fn load(&self, trip_id: &str) -> Result<Trip, AppError> {
        if !IdGenerator::validate_id(trip_id, Some(IdType::Trip)) {
            return Err(AppError::trip_not_found(trip_id));
        }
        self.store_service
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| AppError::trip_not_found(trip_id))
    }

    /// Load, apply and persist one transition under the trip's lock.
    ///
    /// The version check on save catches writers in other processes.
    async fn transition<F>(&self, trip_id: &str, apply: F) -> Result<(Trip, TransitionOutcome), AppError>
    where
        F: FnOnce(&mut Trip, DateTime<Utc>) -> Result<TransitionOutcome, AppError> + Send,
    {
        if !IdGenerator::validate_id(trip_id, Some(IdType::Trip)) {
            return Err(AppError::trip_not_found(trip_id));
        }

        let lock = self.trip_lock(trip_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.apply_and_save(trip_id, apply).await
        };
        self.release_trip_lock(trip_id, lock).await;
        result
    }

    async fn apply_and_save<F>(&self, trip_id: &str, apply: F) -> Result<(Trip, TransitionOutcome), AppError>
    where
        F: FnOnce(&mut Trip, DateTime<Utc>) -> Result<TransitionOutcome, AppError> + Send,
    {
        let mut trip = self.load(trip_id).await?;
        let outcome = apply(&mut trip, Utc::now())?;

        if outcome == TransitionOutcome::Applied {
            let expected = trip.version;
            trip.version += 1;
            self.store_service.save_trip(&trip, expected).await?;
            tracing::info!("Trip {} is now {} (v{})", trip.id, trip.status_label(), trip.version);
        } else {
            tracing::debug!("Trip {} unchanged, repeated request ignored", trip.id);
        }

        Ok((trip, outcome))
    }

    fn log_notification(result: Result<(), AppError>, event: &str, trip_id: &str) {
        if let Err(e) = result {
            tracing::warn!("Failed to send {} notification for trip {}: {}", event, trip_id, e);
        }
    }

    fn driver_id(actor: &Actor) -> Result<&str, AppError> {
        match actor {
            Actor::Driver(id) => Ok(id),
            other => Err(AppError::forbidden(format!("Only drivers can do this, not {}", other.role()))),
        }
    }

    async fn resolve_route(
        &self,
        pickup: &LocationInput,
        destination: &LocationInput,
    ) -> Result<(Location, Location, f64), AppError> {
        let (pickup, destination) = futures::try_join!(
            resolve_location(self.geocoder.as_ref(), "pickup", pickup),
            resolve_location(self.geocoder.as_ref(), "destination", destination),
        )?;

        let (Some(from), Some(to)) = (pickup.coordinates, destination.coordinates) else {
            return Err(AppError::internal_error("resolved location without coordinates"));
        };
        let distance_km = pricing::round_cents(pricing::distance_km(&from, &to));

        Ok((pickup, destination, distance_km))
    }

    async fn load_many(&self, ids: &[String]) -> Result<Vec<Trip>, AppError> {
        let loaded = join_all(ids.iter().map(|id| self.store_service.get_trip(id))).await;
        let mut trips = Vec::with_capacity(loaded.len());
        for trip in loaded {
            if let Some(trip) = trip? {
                trips.push(trip);
            }
        }
        Ok(trips)
    }
}

#[async_trait]
impl TripOperations for TripService {
    async fn create_trip(&self, actor: &Actor, request: TripRequest) -> Result<TripResponse, AppError> {
        match actor {
            Actor::CooperativeOfficer(id) if *id == request.cooperative_id => {}
            Actor::Admin(_) => {}
            _ => return Err(AppError::forbidden("Only the cooperative's officer can request transport")),
        }

        let crops: Vec<String> = request
            .crops
            .iter()
            .map(|crop| crop.trim().to_string())
            .filter(|crop| !crop.is_empty())
            .collect();

        Validator::new()
            .check(!crops.is_empty(), "crops", "at least one crop is required")
            .require_positive(request.weight_kg, "weight_kg")
            .require_positive(request.price_per_kg, "price_per_kg")
            .require_positive(request.price_per_km, "price_per_km")
            .finish()?;

        let cooperative = self
            .store_service
            .get_cooperative(&request.cooperative_id)
            .await?
            .ok_or_else(|| AppError::cooperative_not_found(&request.cooperative_id))?;

        let mut farmer_ids = request.farmer_ids.clone();
        farmer_ids.sort();
        farmer_ids.dedup();
        if let Some(unknown) = farmer_ids.iter().find(|id| !cooperative.farmer_ids.contains(id)) {
            return Err(AppError::farmer_not_found(unknown));
        }

        let (pickup, destination, distance_km) = self.resolve_route(&request.pickup, &request.destination).await?;

        let now = Utc::now();
        let trip = Trip {
            id: IdGenerator::generate(IdType::Trip),
            tracking_code: IdGenerator::generate_tracking_code(),
            cooperative_id: cooperative.id,
            driver_id: None,
            farmer_ids,
            status: TripStatus::Pending,
            pickup,
            destination,
            crops,
            weight_kg: request.weight_kg,
            pricing: Pricing {
                price_per_kg: request.price_per_kg,
                price_per_km: request.price_per_km,
                weight_kg: request.weight_kg,
                distance_km,
                total: pricing::total_price(request.weight_kg, request.price_per_kg, distance_km, request.price_per_km),
                locked_at: now,
            },
            pickup_evidence: None,
            delivery_evidence: None,
            variance_overridden: false,
            payment_released: false,
            payment_released_at: None,
            disputes: Vec::new(),
            rejected_by: None,
            rejection_reason: None,
            rejected_at: None,
            notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            created_at: now,
            accepted_at: None,
            updated_at: now,
            version: 1,
        };

        self.store_service.create_trip(&trip).await?;

        tracing::info!(
            "Trip {} created by {}: {} kg over {} km for {}",
            trip.id,
            actor,
            trip.weight_kg,
            trip.pricing.distance_km,
            trip.pricing.total
        );
        Ok(trip.into())
    }

    async fn estimate(&self, request: TripEstimateRequest) -> Result<TripEstimate, AppError> {
        Validator::new()
            .require_positive(request.weight_kg, "weight_kg")
            .require_positive(request.price_per_kg, "price_per_kg")
            .require_positive(request.price_per_km, "price_per_km")
            .finish()?;

        let (pickup, destination, distance_km) = self.resolve_route(&request.pickup, &request.destination).await?;
        let total = pricing::total_price(request.weight_kg, request.price_per_kg, distance_km, request.price_per_km);

        Ok(TripEstimate {
            pickup,
            destination,
            distance_km,
            total,
        })
    }

    async fn reprice(&self, actor: &Actor, trip_id: &str, rates: RepriceRequest) -> Result<TripResponse, AppError> {
        let (trip, _) = self
            .transition(trip_id, |trip, now| {
                match actor {
                    Actor::CooperativeOfficer(id) if *id == trip.cooperative_id => {}
                    Actor::Admin(_) => {}
                    _ => return Err(AppError::forbidden("Only the cooperative's officer can change rates")),
                }
                lifecycle::reprice(trip, &rates, now)
            })
            .await?;
        Ok(trip.into())
    }

    async fn get_trip(&self, trip_id: &str) -> Result<Option<TripResponse>, AppError> {
        tracing::debug!("Getting trip: {}", trip_id);
        Ok(self.store_service.get_trip(trip_id).await?.map(TripResponse::from))
    }

    async fn list_trips(&self, filter: TripFilter) -> Result<Vec<TripResponse>, AppError> {
        let index = match (&filter.cooperative_id, &filter.driver_id) {
            (Some(cooperative_id), _) => StoreKeys::trips_by_cooperative(cooperative_id),
            (None, Some(driver_id)) => StoreKeys::trips_by_driver(driver_id),
            (None, None) => StoreKeys::all_trips(),
        };
        let ids = self.store_service.get_trip_ids(&index).await?;
        tracing::debug!("Listing {} candidate trips from {}", ids.len(), index.render());

        let mut trips: Vec<Trip> = self
            .load_many(&ids)
            .await?
            .into_iter()
            .filter(|trip| filter.cooperative_id.as_ref().is_none_or(|id| *id == trip.cooperative_id))
            .filter(|trip| filter.driver_id.is_none() || trip.driver_id == filter.driver_id)
            .filter(|trip| filter.status.is_none_or(|status| status == trip.status))
            .collect();
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(trips.into_iter().map(TripResponse::from).collect())
    }

    async fn list_open_trips(&self) -> Result<Vec<TripResponse>, AppError> {
        let trips = self
            .list_trips(TripFilter {
                status: Some(TripStatus::Pending),
                ..Default::default()
            })
            .await?;
        Ok(trips.into_iter().filter(|trip| trip.driver_id.is_none()).collect())
    }

    async fn accept_trip(&self, actor: &Actor, trip_id: &str) -> Result<TripResponse, AppError> {
        let driver_id = Self::driver_id(actor)?;
        let driver = self
            .store_service
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| AppError::driver_not_found(driver_id))?;

        let (trip, outcome) = self
            .transition(trip_id, |trip, now| lifecycle::accept(trip, &driver, now))
            .await?;

        if outcome == TransitionOutcome::Applied {
            let result = self.notification_service.notify_trip_accepted(&trip, &driver).await;
            Self::log_notification(result, "trip accepted", &trip.id);
        }
        Ok(trip.into())
    }

    async fn reject_trip(&self, actor: &Actor, trip_id: &str, request: RejectionRequest) -> Result<TripResponse, AppError> {
        let driver_id = Self::driver_id(actor)?;

        let (trip, outcome) = self
            .transition(trip_id, |trip, now| lifecycle::reject(trip, driver_id, request.reason, now))
            .await?;

        if outcome == TransitionOutcome::Applied {
            let result = self.notification_service.notify_trip_rejected(&trip).await;
            Self::log_notification(result, "trip rejected", &trip.id);
        }
        Ok(trip.into())
    }

    async fn confirm_pickup(
        &self,
        actor: &Actor,
        trip_id: &str,
        submission: EvidenceSubmission,
    ) -> Result<TripResponse, AppError> {
        let driver_id = Self::driver_id(actor)?;

        let (trip, outcome) = self
            .transition(trip_id, |trip, now| lifecycle::confirm_pickup(trip, driver_id, &submission, now))
            .await?;

        if outcome == TransitionOutcome::Applied {
            let result = self.notification_service.notify_pickup_confirmed(&trip).await;
            Self::log_notification(result, "pickup", &trip.id);
        }
        Ok(trip.into())
    }

    async fn confirm_delivery(
        &self,
        actor: &Actor,
        trip_id: &str,
        submission: EvidenceSubmission,
    ) -> Result<TripResponse, AppError> {
        let driver_id = Self::driver_id(actor)?;
        let threshold = self.variance_threshold;

        let (trip, outcome) = self
            .transition(trip_id, |trip, now| {
                lifecycle::confirm_delivery(trip, driver_id, &submission, threshold, now)
            })
            .await?;

        if outcome == TransitionOutcome::Applied {
            let result = self.notification_service.notify_delivery_confirmed(&trip).await;
            Self::log_notification(result, "delivery", &trip.id);
        }
        Ok(trip.into())
    }

    async fn raise_dispute(&self, actor: &Actor, trip_id: &str, request: DisputeRequest) -> Result<TripResponse, AppError> {
        let (trip, outcome) = self
            .transition(trip_id, |trip, now| lifecycle::raise_dispute(trip, actor, &request.reason, now))
            .await?;

        if outcome == TransitionOutcome::Applied {
            let result = self.notification_service.notify_dispute_raised(&trip, actor).await;
            Self::log_notification(result, "dispute raised", &trip.id);
        }
        Ok(trip.into())
    }

    async fn resolve_dispute(
        &self,
        actor: &Actor,
        trip_id: &str,
        resolution: DisputeResolution,
    ) -> Result<TripResponse, AppError> {
        let (trip, outcome) = self
            .transition(trip_id, |trip, now| lifecycle::resolve_dispute(trip, actor, &resolution, now))
            .await?;

        if outcome == TransitionOutcome::Applied {
            let result = self.notification_service.notify_dispute_resolved(&trip).await;
            Self::log_notification(result, "dispute resolved", &trip.id);
        }
        Ok(trip.into())
    }
}
