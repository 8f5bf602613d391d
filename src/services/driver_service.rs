// src/services/driver_service.rs
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing;

use crate::{
    errors::HaulageError as AppError,
    models::{
        actor::Actor,
        driver::{
            Driver, DriverAvailabilityUpdate, DriverLocation, DriverLocationUpdate, DriverRegistration,
            DriverResponse, PinLogin,
        },
    },
    services::store_service::StoreService,
    utils::{
        id_generator::{IdGenerator, IdType},
        validation::{Validator, normalize_phone},
    },
};

#[async_trait]
pub trait DriverOperations: Send + Sync {
    async fn register_driver(&self, registration: DriverRegistration) -> Result<DriverResponse, AppError>;
    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverResponse>, AppError>;
    async fn verify_driver(&self, actor: &Actor, driver_id: &str) -> Result<DriverResponse, AppError>;
    async fn set_availability(
        &self,
        actor: &Actor,
        driver_id: &str,
        update: DriverAvailabilityUpdate,
    ) -> Result<DriverResponse, AppError>;
    async fn update_location(
        &self,
        actor: &Actor,
        driver_id: &str,
        update: DriverLocationUpdate,
    ) -> Result<DriverResponse, AppError>;
    async fn authenticate(&self, login: PinLogin) -> Result<DriverResponse, AppError>;
    async fn list_available_drivers(&self) -> Result<Vec<DriverResponse>, AppError>;
}

const MAX_PROFILE_WRITE_ATTEMPTS: u32 = 5;

pub struct DriverService {
    store_service: Arc<StoreService>,
}

impl DriverService {
    pub fn new(store_service: Arc<StoreService>) -> Self {
        Self { store_service }
    }

    async fn load(&self, driver_id: &str) -> Result<Driver, AppError> {
        if !IdGenerator::validate_id(driver_id, Some(IdType::Driver)) {
            tracing::warn!("Invalid driver ID format: {}", driver_id);
            return Err(AppError::driver_not_found(driver_id));
        }
        self.store_service
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| AppError::driver_not_found(driver_id))
    }

    /// Applies `change` to a fresh copy of the driver and writes it back
    /// versioned, reloading when another write got there first.
    async fn update_driver<F>(&self, driver_id: &str, mut change: F) -> Result<Driver, AppError>
    where
        F: FnMut(&mut Driver) -> bool + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut driver = self.load(driver_id).await?;
            if !change(&mut driver) {
                return Ok(driver);
            }

            let base = driver.version;
            driver.version = base + 1;
            driver.updated_at = Utc::now();
            match self.store_service.save_driver(&driver, base).await {
                Ok(()) => return Ok(driver),
                Err(AppError::Conflict(_)) if attempt < MAX_PROFILE_WRITE_ATTEMPTS => {
                    tracing::debug!("Driver {} changed underneath, retrying (attempt {})", driver_id, attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn ensure_self_or_admin(actor: &Actor, driver_id: &str) -> Result<(), AppError> {
        match actor {
            Actor::Driver(id) if id == driver_id => Ok(()),
            Actor::Admin(_) => Ok(()),
            _ => Err(AppError::forbidden("Only the driver can update their own profile")),
        }
    }
}

#[async_trait]
impl DriverOperations for DriverService {
    async fn register_driver(&self, registration: DriverRegistration) -> Result<DriverResponse, AppError> {
        let phone_number = normalize_phone(&registration.phone_number);

        Validator::new()
            .require_text(&registration.name, "name")
            .require_phone(&phone_number, "phone_number")
            .require_pin(&registration.pin, "pin")
            .require_text(&registration.plate_number, "plate_number")
            .require_positive(registration.capacity_kg, "capacity_kg")
            .finish()?;

        if let Some(cooperative_id) = &registration.cooperative_id {
            if self.store_service.get_cooperative(cooperative_id).await?.is_none() {
                return Err(AppError::cooperative_not_found(cooperative_id));
            }
        }

        let now = Utc::now();
        let driver = Driver {
            id: IdGenerator::generate(IdType::Driver),
            name: registration.name.trim().to_string(),
            phone_number,
            pin: registration.pin,
            plate_number: registration.plate_number.trim().to_uppercase(),
            capacity_kg: registration.capacity_kg,
            is_verified: false,
            is_available: false,
            rating: 0.0,
            cooperative_id: registration.cooperative_id,
            current_location: None,
            device_token: registration.device_token,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.store_service.create_driver(&driver).await?;

        tracing::info!("Driver registered successfully: {}", driver.id);
        Ok(driver.into())
    }

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverResponse>, AppError> {
        tracing::debug!("Getting driver: {}", driver_id);
        Ok(self.store_service.get_driver(driver_id).await?.map(DriverResponse::from))
    }

    async fn verify_driver(&self, actor: &Actor, driver_id: &str) -> Result<DriverResponse, AppError> {
        if !matches!(actor, Actor::Admin(_)) {
            return Err(AppError::forbidden("Only an admin can verify drivers"));
        }

        let mut newly_verified = false;
        let driver = self
            .update_driver(driver_id, |driver| {
                newly_verified = !driver.is_verified;
                driver.is_verified = true;
                newly_verified
            })
            .await?;
        if newly_verified {
            tracing::info!("Driver {} verified by {}", driver_id, actor);
        }
        Ok(driver.into())
    }

    async fn set_availability(
        &self,
        actor: &Actor,
        driver_id: &str,
        update: DriverAvailabilityUpdate,
    ) -> Result<DriverResponse, AppError> {
        Self::ensure_self_or_admin(actor, driver_id)?;

        let driver = self
            .update_driver(driver_id, |driver| {
                driver.is_available = update.is_available;
                true
            })
            .await?;

        tracing::info!("Driver {} availability set to {}", driver_id, update.is_available);
        Ok(driver.into())
    }

    async fn update_location(
        &self,
        actor: &Actor,
        driver_id: &str,
        update: DriverLocationUpdate,
    ) -> Result<DriverResponse, AppError> {
        Self::ensure_self_or_admin(actor, driver_id)?;

        if !update.point.is_valid() {
            return Err(AppError::invalid_field(
                "point",
                format!("{}, {}", update.point.latitude, update.point.longitude),
                "coordinates out of range",
            ));
        }

        // Latest arrival wins for the location itself; other fields are preserved
        let location = DriverLocation {
            point: update.point,
            heading: update.heading,
            speed: update.speed,
            recorded_at: update.recorded_at.unwrap_or_else(Utc::now),
        };
        let driver = self
            .update_driver(driver_id, |driver| {
                driver.current_location = Some(location.clone());
                true
            })
            .await?;

        tracing::debug!("Updated driver location: {}", driver_id);
        Ok(driver.into())
    }

    async fn authenticate(&self, login: PinLogin) -> Result<DriverResponse, AppError> {
        let phone_number = normalize_phone(&login.phone_number);
        let rejected = || AppError::Unauthorized("Invalid phone number or PIN".to_string());

        let driver_id = self
            .store_service
            .get_driver_id_by_phone(&phone_number)
            .await?
            .ok_or_else(rejected)?;
        let driver = self.store_service.get_driver(&driver_id).await?.ok_or_else(rejected)?;

        if driver.pin != login.pin {
            tracing::warn!("Failed PIN login for driver {}", driver.id);
            return Err(rejected());
        }

        tracing::info!("Driver {} signed in", driver.id);
        Ok(driver.into())
    }

    async fn list_available_drivers(&self) -> Result<Vec<DriverResponse>, AppError> {
        let ids = self.store_service.get_driver_ids().await?;
        let loaded = join_all(ids.iter().map(|id| self.store_service.get_driver(id))).await;

        let mut drivers = Vec::new();
        for driver in loaded {
            if let Some(driver) = driver? {
                if driver.is_available && driver.is_verified {
                    drivers.push(driver);
                }
            }
        }
        drivers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(drivers.into_iter().map(DriverResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::GeoPoint;

    fn registration(phone: &str) -> DriverRegistration {
        DriverRegistration {
            name: "Jean Bosco".to_string(),
            phone_number: phone.to_string(),
            pin: "4321".to_string(),
            plate_number: "rac 123 b".to_string(),
            capacity_kg: 3000.0,
            cooperative_id: None,
            device_token: Some("token-1".to_string()),
        }
    }

    fn service() -> DriverService {
        DriverService::new(Arc::new(StoreService::new_memory()))
    }

    #[tokio::test]
    async fn test_register_driver() {
        let service = service();
        let driver = service.register_driver(registration("+250 788 111 222")).await.unwrap();

        assert!(IdGenerator::validate_id(&driver.id, Some(IdType::Driver)));
        assert_eq!(driver.phone_number, "+250788111222");
        assert_eq!(driver.plate_number, "RAC 123 B");
        assert!(!driver.is_verified);
        assert!(!driver.is_available);
    }

    #[tokio::test]
    async fn test_phone_must_be_unique() {
        let service = service();
        service.register_driver(registration("0788111222")).await.unwrap();
        let err = service.register_driver(registration("0788111222")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_pin() {
        let mut bad = registration("0788111222");
        bad.pin = "12".to_string();
        let err = service().register_driver(bad).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(ref errors) if errors[0].field == "pin"));
    }

    #[tokio::test]
    async fn test_only_admin_verifies() {
        let service = service();
        let driver = service.register_driver(registration("0788111222")).await.unwrap();

        let err = service
            .verify_driver(&Actor::Driver(driver.id.clone()), &driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let verified = service.verify_driver(&Actor::Admin("ops".to_string()), &driver.id).await.unwrap();
        assert!(verified.is_verified);
    }

    #[tokio::test]
    async fn test_available_list_only_has_verified_available_drivers() {
        let service = service();
        let admin = Actor::Admin("ops".to_string());
        let ready = service.register_driver(registration("0788111222")).await.unwrap();
        let idle = service.register_driver(registration("0788111333")).await.unwrap();

        service.verify_driver(&admin, &ready.id).await.unwrap();
        service
            .set_availability(&Actor::Driver(ready.id.clone()), &ready.id, DriverAvailabilityUpdate { is_available: true })
            .await
            .unwrap();
        service
            .set_availability(&Actor::Driver(idle.id.clone()), &idle.id, DriverAvailabilityUpdate { is_available: true })
            .await
            .unwrap();

        let available = service.list_available_drivers().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, ready.id);
    }

    #[tokio::test]
    async fn test_location_update_by_other_driver_is_forbidden() {
        let service = service();
        let driver = service.register_driver(registration("0788111222")).await.unwrap();
        let update = DriverLocationUpdate {
            point: GeoPoint::new(-1.95, 30.06),
            heading: None,
            speed: Some(40.0),
            recorded_at: None,
        };

        let err = service
            .update_location(&Actor::Driver("drv-251018-other".to_string()), &driver.id, update)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_interleaved_verify_and_location_update_both_persist() {
        let service = service();
        let driver = service.register_driver(registration("0788111222")).await.unwrap();
        let admin = Actor::Admin("ops".to_string());
        let me = Actor::Driver(driver.id.clone());

        let location = DriverLocationUpdate {
            point: GeoPoint::new(-1.95, 30.06),
            heading: Some(90.0),
            speed: Some(40.0),
            recorded_at: None,
        };
        let (verified, moved) = futures::future::join(
            service.verify_driver(&admin, &driver.id),
            service.update_location(&me, &driver.id, location),
        )
        .await;
        verified.unwrap();
        moved.unwrap();

        let stored = service.store_service.get_driver(&driver.id).await.unwrap().unwrap();
        assert!(stored.is_verified);
        assert_eq!(stored.current_location.map(|l| l.point), Some(GeoPoint::new(-1.95, 30.06)));
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_stale_profile_write_is_retried_on_fresh_copy() {
        let service = service();
        let driver = service.register_driver(registration("0788111222")).await.unwrap();
        let mut stored = service.store_service.get_driver(&driver.id).await.unwrap().unwrap();

        let mut raced = false;
        let updated = service
            .update_driver(&driver.id, |fresh| {
                if !raced {
                    raced = true;
                    // Simulate another writer landing between load and save
                    stored.is_verified = true;
                    stored.version += 1;
                    let store = service.store_service.clone();
                    let competing = stored.clone();
                    futures::executor::block_on(async move { store.save_driver(&competing, 1).await }).unwrap();
                }
                fresh.is_available = true;
                true
            })
            .await
            .unwrap();

        assert!(updated.is_available);
        assert!(updated.is_verified);
        assert_eq!(updated.version, 3);
    }

    #[tokio::test]
    async fn test_verifying_twice_does_not_bump_version() {
        let service = service();
        let driver = service.register_driver(registration("0788111222")).await.unwrap();
        let admin = Actor::Admin("ops".to_string());

        service.verify_driver(&admin, &driver.id).await.unwrap();
        service.verify_driver(&admin, &driver.id).await.unwrap();

        let stored = service.store_service.get_driver(&driver.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let service = service();
        let driver = service.register_driver(registration("0788111222")).await.unwrap();

        let ok = service
            .authenticate(PinLogin {
                phone_number: "0788111222".to_string(),
                pin: "4321".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(ok.id, driver.id);

        let err = service
            .authenticate(PinLogin {
                phone_number: "0788111222".to_string(),
                pin: "0000".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
