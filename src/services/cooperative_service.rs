// src/services/cooperative_service.rs
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing;

use crate::{
    errors::HaulageError as AppError,
    models::{
        actor::Actor,
        cooperative::{
            Cooperative, CooperativeRegistration, CooperativeResponse, CooperativeStatus, Farmer, FarmerRegistration,
        },
        driver::PinLogin,
    },
    services::store_service::StoreService,
    utils::{
        id_generator::{IdGenerator, IdType},
        validation::{Validator, normalize_phone},
    },
};

#[async_trait]
pub trait CooperativeOperations: Send + Sync {
    async fn register_cooperative(&self, registration: CooperativeRegistration) -> Result<CooperativeResponse, AppError>;
    async fn get_cooperative(&self, cooperative_id: &str) -> Result<Option<CooperativeResponse>, AppError>;
    async fn verify_cooperative(&self, actor: &Actor, cooperative_id: &str) -> Result<CooperativeResponse, AppError>;
    async fn authenticate(&self, login: PinLogin) -> Result<CooperativeResponse, AppError>;
    async fn register_farmer(
        &self,
        actor: &Actor,
        cooperative_id: &str,
        registration: FarmerRegistration,
    ) -> Result<Farmer, AppError>;
    async fn get_farmer(&self, farmer_id: &str) -> Result<Option<Farmer>, AppError>;
    async fn list_farmers(&self, cooperative_id: &str) -> Result<Vec<Farmer>, AppError>;
}

pub struct CooperativeService {
    store_service: Arc<StoreService>,
}

impl CooperativeService {
    pub fn new(store_service: Arc<StoreService>) -> Self {
        Self { store_service }
    }

    async fn load(&self, cooperative_id: &str) -> Result<Cooperative, AppError> {
        if !IdGenerator::validate_id(cooperative_id, Some(IdType::Cooperative)) {
            return Err(AppError::cooperative_not_found(cooperative_id));
        }
        self.store_service
            .get_cooperative(cooperative_id)
            .await?
            .ok_or_else(|| AppError::cooperative_not_found(cooperative_id))
    }
}

#[async_trait]
impl CooperativeOperations for CooperativeService {
    async fn register_cooperative(&self, registration: CooperativeRegistration) -> Result<CooperativeResponse, AppError> {
        let phone_number = normalize_phone(&registration.phone_number);

        Validator::new()
            .require_text(&registration.name, "name")
            .require_text(&registration.officer_name, "officer_name")
            .require_phone(&phone_number, "phone_number")
            .require_pin(&registration.pin, "pin")
            .require_text(&registration.location.address, "location")
            .finish()?;

        let now = Utc::now();
        let cooperative = Cooperative {
            id: IdGenerator::generate(IdType::Cooperative),
            name: registration.name.trim().to_string(),
            officer_name: registration.officer_name.trim().to_string(),
            phone_number,
            pin: registration.pin,
            status: CooperativeStatus::Pending,
            location: registration.location,
            farmer_ids: Vec::new(),
            device_token: registration.device_token,
            created_at: now,
            updated_at: now,
        };

        self.store_service.create_cooperative(&cooperative).await?;

        tracing::info!("Cooperative registered: {} ({})", cooperative.id, cooperative.name);
        Ok(cooperative.into())
    }

    async fn get_cooperative(&self, cooperative_id: &str) -> Result<Option<CooperativeResponse>, AppError> {
        tracing::debug!("Getting cooperative: {}", cooperative_id);
        Ok(self
            .store_service
            .get_cooperative(cooperative_id)
            .await?
            .map(CooperativeResponse::from))
    }

    async fn verify_cooperative(&self, actor: &Actor, cooperative_id: &str) -> Result<CooperativeResponse, AppError> {
        if !matches!(actor, Actor::Admin(_)) {
            return Err(AppError::forbidden("Only an admin can verify cooperatives"));
        }

        let mut cooperative = self.load(cooperative_id).await?;
        if cooperative.status != CooperativeStatus::Verified {
            cooperative.status = CooperativeStatus::Verified;
            cooperative.updated_at = Utc::now();
            self.store_service.put_cooperative(&cooperative).await?;
            tracing::info!("Cooperative {} verified by {}", cooperative_id, actor);
        }
        Ok(cooperative.into())
    }

    async fn authenticate(&self, login: PinLogin) -> Result<CooperativeResponse, AppError> {
        let phone_number = normalize_phone(&login.phone_number);
        let rejected = || AppError::Unauthorized("Invalid phone number or PIN".to_string());

        let cooperative_id = self
            .store_service
            .get_cooperative_id_by_phone(&phone_number)
            .await?
            .ok_or_else(rejected)?;
        let cooperative = self
            .store_service
            .get_cooperative(&cooperative_id)
            .await?
            .ok_or_else(rejected)?;

        if cooperative.pin != login.pin {
            tracing::warn!("Failed PIN login for cooperative {}", cooperative.id);
            return Err(rejected());
        }

        Ok(cooperative.into())
    }

    async fn register_farmer(
        &self,
        actor: &Actor,
        cooperative_id: &str,
        registration: FarmerRegistration,
    ) -> Result<Farmer, AppError> {
        match actor {
            Actor::CooperativeOfficer(id) if id == cooperative_id => {}
            Actor::Admin(_) => {}
            _ => return Err(AppError::forbidden("Only the cooperative's officer can register its farmers")),
        }

        let phone_number = normalize_phone(&registration.phone_number);
        Validator::new()
            .require_text(&registration.name, "name")
            .require_phone(&phone_number, "phone_number")
            .require_text(&registration.location, "location")
            .finish()?;

        let cooperative = self.load(cooperative_id).await?;

        let farmer = Farmer {
            id: IdGenerator::generate(IdType::Farmer),
            cooperative_id: cooperative.id,
            name: registration.name.trim().to_string(),
            phone_number,
            location: registration.location.trim().to_string(),
            crops: registration.crops,
            created_at: Utc::now(),
        };
        self.store_service.add_farmer(&farmer).await?;

        tracing::info!("Farmer {} registered with cooperative {}", farmer.id, cooperative_id);
        Ok(farmer)
    }

    async fn get_farmer(&self, farmer_id: &str) -> Result<Option<Farmer>, AppError> {
        self.store_service.get_farmer(farmer_id).await
    }

    async fn list_farmers(&self, cooperative_id: &str) -> Result<Vec<Farmer>, AppError> {
        let cooperative = self.load(cooperative_id).await?;
        let loaded = join_all(cooperative.farmer_ids.iter().map(|id| self.store_service.get_farmer(id))).await;

        let mut farmers = Vec::with_capacity(loaded.len());
        for farmer in loaded {
            if let Some(farmer) = farmer? {
                farmers.push(farmer);
            }
        }
        farmers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(farmers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::Location;

    fn registration() -> CooperativeRegistration {
        CooperativeRegistration {
            name: "Musanze Potato Growers".to_string(),
            officer_name: "Alice Uwase".to_string(),
            phone_number: "0788000111".to_string(),
            pin: "2468".to_string(),
            location: Location {
                address: "Musanze".to_string(),
                coordinates: None,
            },
            device_token: None,
        }
    }

    fn farmer(name: &str) -> FarmerRegistration {
        FarmerRegistration {
            name: name.to_string(),
            phone_number: "0788999000".to_string(),
            location: "Kinigi".to_string(),
            crops: vec!["potatoes".to_string()],
        }
    }

    fn service() -> CooperativeService {
        CooperativeService::new(Arc::new(StoreService::new_memory()))
    }

    #[tokio::test]
    async fn test_registered_cooperative_is_pending() {
        let cooperative = service().register_cooperative(registration()).await.unwrap();
        assert_eq!(cooperative.status, CooperativeStatus::Pending);
        assert!(cooperative.farmer_ids.is_empty());
    }

    #[tokio::test]
    async fn test_admin_verifies_cooperative() {
        let service = service();
        let cooperative = service.register_cooperative(registration()).await.unwrap();

        let officer = Actor::CooperativeOfficer(cooperative.id.clone());
        assert!(matches!(
            service.verify_cooperative(&officer, &cooperative.id).await,
            Err(AppError::Forbidden(_))
        ));

        let verified = service
            .verify_cooperative(&Actor::Admin("ops".to_string()), &cooperative.id)
            .await
            .unwrap();
        assert_eq!(verified.status, CooperativeStatus::Verified);
    }

    #[tokio::test]
    async fn test_farmers_are_appended_to_cooperative() {
        let service = service();
        let cooperative = service.register_cooperative(registration()).await.unwrap();
        let officer = Actor::CooperativeOfficer(cooperative.id.clone());

        let first = service.register_farmer(&officer, &cooperative.id, farmer("Eric")).await.unwrap();
        let second = service.register_farmer(&officer, &cooperative.id, farmer("Grace")).await.unwrap();

        let reloaded = service.get_cooperative(&cooperative.id).await.unwrap().unwrap();
        assert_eq!(reloaded.farmer_ids.len(), 2);
        assert!(reloaded.farmer_ids.contains(&first.id));
        assert!(reloaded.farmer_ids.contains(&second.id));

        assert_eq!(service.list_farmers(&cooperative.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_cooperative_cannot_register_farmers() {
        let service = service();
        let cooperative = service.register_cooperative(registration()).await.unwrap();
        let outsider = Actor::CooperativeOfficer("cop-251018-other".to_string());

        let err = service
            .register_farmer(&outsider, &cooperative.id, farmer("Eric"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_authenticate_with_pin() {
        let service = service();
        let cooperative = service.register_cooperative(registration()).await.unwrap();

        let login = PinLogin {
            phone_number: "0788 000 111".to_string(),
            pin: "2468".to_string(),
        };
        assert_eq!(service.authenticate(login).await.unwrap().id, cooperative.id);

        let login = PinLogin {
            phone_number: "0788000111".to_string(),
            pin: "1111".to_string(),
        };
        assert!(matches!(service.authenticate(login).await, Err(AppError::Unauthorized(_))));
    }
}
