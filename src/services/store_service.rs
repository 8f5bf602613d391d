// src/services/store_service.rs
use async_trait::async_trait;
use redis::Client;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing;

use crate::errors::HaulageError as AppError;
use crate::models::{
    cooperative::{Cooperative, Farmer},
    driver::Driver,
    trip::Trip,
};

// Store key strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    Simple(String),
    Composite(Vec<String>),
}

impl StoreKey {
    fn composite(parts: &[&str]) -> Self {
        StoreKey::Composite(parts.iter().map(|part| part.to_string()).collect())
    }

    pub fn render(&self) -> String {
        match self {
            StoreKey::Simple(key) => key.clone(),
            StoreKey::Composite(parts) => parts.join(":"),
        }
    }
}

/// Result of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    Missing,
    VersionMismatch,
}

#[async_trait]
pub trait KeyOperations: Send + Sync {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &StoreKey, value: &str) -> Result<(), StoreError>;
    async fn set_if_absent(&self, key: &StoreKey, value: &str) -> Result<bool, StoreError>;
    /// Writes `value` only if the stored JSON document carries `expected_version`.
    async fn compare_and_set(&self, key: &StoreKey, expected_version: u64, value: &str) -> Result<CasOutcome, StoreError>;
}

#[async_trait]
pub trait SetOperations: Send + Sync {
    async fn sadd(&self, key: &StoreKey, value: &str) -> Result<(), StoreError>;
    async fn smembers(&self, key: &StoreKey) -> Result<Vec<String>, StoreError>;
}

// Enum to wrap the storage backends
pub enum Store {
    Redis(RedisStore),
    Memory(MemoryStore),
}

pub struct RedisStore {
    client: Client,
}

const COMPARE_AND_SET_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local document = cjson.decode(current)
if (tonumber(document['version']) or 0) ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        let instance = Self { client };

        // Fail at startup rather than on the first request
        instance.get_connection().await?;
        Ok(instance)
    }

    async fn get_connection(&self) -> Result<redis::aio::Connection, StoreError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))
    }
}

#[async_trait]
impl KeyOperations for RedisStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        let data: Option<String> = redis::cmd("GET")
            .arg(key.render())
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::OperationError(e.to_string()))?;
        Ok(data)
    }

    async fn set(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key.render())
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::OperationError(e.to_string()))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &StoreKey, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key.render())
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::OperationError(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn compare_and_set(&self, key: &StoreKey, expected_version: u64, value: &str) -> Result<CasOutcome, StoreError> {
        let mut conn = self.get_connection().await?;
        let reply: i64 = redis::Script::new(COMPARE_AND_SET_SCRIPT)
            .key(key.render())
            .arg(expected_version)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::OperationError(e.to_string()))?;

        Ok(match reply {
            1 => CasOutcome::Applied,
            -1 => CasOutcome::Missing,
            _ => CasOutcome::VersionMismatch,
        })
    }
}

#[async_trait]
impl SetOperations for RedisStore {
    async fn sadd(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("SADD")
            .arg(key.render())
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::OperationError(e.to_string()))?;
        Ok(())
    }

    async fn smembers(&self, key: &StoreKey) -> Result<Vec<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key.render())
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::OperationError(e.to_string()))?;
        Ok(members)
    }
}

// Memory store for development/testing
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyOperations for MemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(&key.render()).cloned())
    }

    async fn set(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        self.values.write().await.insert(key.render(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &StoreKey, value: &str) -> Result<bool, StoreError> {
        let mut values = self.values.write().await;
        let key = key.render();
        if values.contains_key(&key) {
            return Ok(false);
        }
        values.insert(key, value.to_string());
        Ok(true)
    }

    async fn compare_and_set(&self, key: &StoreKey, expected_version: u64, value: &str) -> Result<CasOutcome, StoreError> {
        let mut values = self.values.write().await;
        let key = key.render();

        let Some(current) = values.get(&key) else {
            return Ok(CasOutcome::Missing);
        };
        let document: serde_json::Value =
            serde_json::from_str(current).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        // Documents written before versioning count as version 0
        if document.get("version").and_then(|v| v.as_u64()).unwrap_or(0) != expected_version {
            return Ok(CasOutcome::VersionMismatch);
        }

        values.insert(key, value.to_string());
        Ok(CasOutcome::Applied)
    }
}

#[async_trait]
impl SetOperations for MemoryStore {
    async fn sadd(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        self.sets
            .write()
            .await
            .entry(key.render())
            .or_default()
            .insert(value.to_string());
        Ok(())
    }

    async fn smembers(&self, key: &StoreKey) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .read()
            .await
            .get(&key.render())
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

// Enum delegations
#[async_trait]
impl KeyOperations for Store {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        match self {
            Store::Redis(store) => store.get(key).await,
            Store::Memory(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        match self {
            Store::Redis(store) => store.set(key, value).await,
            Store::Memory(store) => store.set(key, value).await,
        }
    }

    async fn set_if_absent(&self, key: &StoreKey, value: &str) -> Result<bool, StoreError> {
        match self {
            Store::Redis(store) => store.set_if_absent(key, value).await,
            Store::Memory(store) => store.set_if_absent(key, value).await,
        }
    }

    async fn compare_and_set(&self, key: &StoreKey, expected_version: u64, value: &str) -> Result<CasOutcome, StoreError> {
        match self {
            Store::Redis(store) => store.compare_and_set(key, expected_version, value).await,
            Store::Memory(store) => store.compare_and_set(key, expected_version, value).await,
        }
    }
}

#[async_trait]
impl SetOperations for Store {
    async fn sadd(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        match self {
            Store::Redis(store) => store.sadd(key, value).await,
            Store::Memory(store) => store.sadd(key, value).await,
        }
    }

    async fn smembers(&self, key: &StoreKey) -> Result<Vec<String>, StoreError> {
        match self {
            Store::Redis(store) => store.smembers(key).await,
            Store::Memory(store) => store.smembers(key).await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Operation error: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ConnectionError(msg) => AppError::RedisConnection(msg),
            StoreError::OperationError(msg) => AppError::RedisQuery(msg),
            StoreError::SerializationError(msg) => AppError::StoreSerialization(msg),
        }
    }
}

// Key generators for each record kind
pub struct StoreKeys;

impl StoreKeys {
    pub fn trip_by_id(trip_id: &str) -> StoreKey {
        StoreKey::composite(&["trip", "id", trip_id])
    }

    pub fn all_trips() -> StoreKey {
        StoreKey::Simple("trips:all".to_string())
    }

    pub fn trips_by_cooperative(cooperative_id: &str) -> StoreKey {
        StoreKey::composite(&["trips", "cooperative", cooperative_id])
    }

    pub fn trips_by_driver(driver_id: &str) -> StoreKey {
        StoreKey::composite(&["trips", "driver", driver_id])
    }

    pub fn driver_by_id(driver_id: &str) -> StoreKey {
        StoreKey::composite(&["driver", "id", driver_id])
    }

    pub fn driver_by_phone(phone: &str) -> StoreKey {
        StoreKey::composite(&["driver", "phone", phone])
    }

    pub fn all_drivers() -> StoreKey {
        StoreKey::Simple("drivers:all".to_string())
    }

    pub fn cooperative_by_id(cooperative_id: &str) -> StoreKey {
        StoreKey::composite(&["cooperative", "id", cooperative_id])
    }

    pub fn cooperative_by_phone(phone: &str) -> StoreKey {
        StoreKey::composite(&["cooperative", "phone", phone])
    }

    pub fn farmer_by_id(farmer_id: &str) -> StoreKey {
        StoreKey::composite(&["farmer", "id", farmer_id])
    }

    pub fn farmers_by_cooperative(cooperative_id: &str) -> StoreKey {
        StoreKey::composite(&["farmers", "cooperative", cooperative_id])
    }
}

// Typed access over a backend
pub struct StoreService {
    store: Store,
}

impl StoreService {
    pub async fn new(redis_url: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting trip store to Redis");
        Ok(Self {
            store: Store::Redis(RedisStore::new(redis_url).await?),
        })
    }

    pub fn new_memory() -> Self {
        Self {
            store: Store::Memory(MemoryStore::new()),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &StoreKey) -> Result<Option<T>, AppError> {
        match self.store.get(key).await? {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| StoreError::SerializationError(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
        serde_json::to_string(value).map_err(|e| StoreError::SerializationError(e.to_string()).into())
    }

    // Trips
    pub async fn create_trip(&self, trip: &Trip) -> Result<(), AppError> {
        let json = Self::to_json(trip)?;
        if !self.store.set_if_absent(&StoreKeys::trip_by_id(&trip.id), &json).await? {
            return Err(AppError::Conflict(format!("Trip {} already exists", trip.id)));
        }

        self.store.sadd(&StoreKeys::all_trips(), &trip.id).await?;
        self.store
            .sadd(&StoreKeys::trips_by_cooperative(&trip.cooperative_id), &trip.id)
            .await?;
        Ok(())
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        self.get_json(&StoreKeys::trip_by_id(trip_id)).await
    }

    /// Persists `trip` only if the stored copy is still at `expected_version`.
    pub async fn save_trip(&self, trip: &Trip, expected_version: u64) -> Result<(), AppError> {
        let json = Self::to_json(trip)?;
        match self
            .store
            .compare_and_set(&StoreKeys::trip_by_id(&trip.id), expected_version, &json)
            .await?
        {
            CasOutcome::Applied => {}
            CasOutcome::Missing => return Err(AppError::trip_not_found(&trip.id)),
            CasOutcome::VersionMismatch => {
                tracing::warn!("Stale write rejected for trip {} at version {}", trip.id, expected_version);
                return Err(AppError::Conflict(format!(
                    "Trip {} was modified concurrently, reload and retry",
                    trip.id
                )));
            }
        }

        if let Some(driver_id) = &trip.driver_id {
            self.store.sadd(&StoreKeys::trips_by_driver(driver_id), &trip.id).await?;
        }
        Ok(())
    }

    pub async fn get_trip_ids(&self, index: &StoreKey) -> Result<Vec<String>, AppError> {
        Ok(self.store.smembers(index).await?)
    }

    // Drivers
    pub async fn create_driver(&self, driver: &Driver) -> Result<(), AppError> {
        if !self
            .store
            .set_if_absent(&StoreKeys::driver_by_phone(&driver.phone_number), &driver.id)
            .await?
        {
            return Err(AppError::validation_error("phone_number", "A driver with this phone number already exists"));
        }
        let json = Self::to_json(driver)?;
        self.store.set(&StoreKeys::driver_by_id(&driver.id), &json).await?;
        self.store.sadd(&StoreKeys::all_drivers(), &driver.id).await?;
        Ok(())
    }

    /// Persists `driver` only if the stored profile is still at `expected_version`.
    pub async fn save_driver(&self, driver: &Driver, expected_version: u64) -> Result<(), AppError> {
        let json = Self::to_json(driver)?;
        match self
            .store
            .compare_and_set(&StoreKeys::driver_by_id(&driver.id), expected_version, &json)
            .await?
        {
            CasOutcome::Applied => Ok(()),
            CasOutcome::Missing => Err(AppError::driver_not_found(&driver.id)),
            CasOutcome::VersionMismatch => {
                tracing::debug!("Stale write rejected for driver {} at version {}", driver.id, expected_version);
                Err(AppError::Conflict(format!(
                    "Driver {} was modified concurrently, reload and retry",
                    driver.id
                )))
            }
        }
    }

    pub async fn get_driver(&self, driver_id: &str) -> Result<Option<Driver>, AppError> {
        self.get_json(&StoreKeys::driver_by_id(driver_id)).await
    }

    pub async fn get_driver_id_by_phone(&self, phone: &str) -> Result<Option<String>, AppError> {
        Ok(self.store.get(&StoreKeys::driver_by_phone(phone)).await?)
    }

    pub async fn get_driver_ids(&self) -> Result<Vec<String>, AppError> {
        Ok(self.store.smembers(&StoreKeys::all_drivers()).await?)
    }

    // Cooperatives and farmers
    pub async fn create_cooperative(&self, cooperative: &Cooperative) -> Result<(), AppError> {
        if !self
            .store
            .set_if_absent(&StoreKeys::cooperative_by_phone(&cooperative.phone_number), &cooperative.id)
            .await?
        {
            return Err(AppError::validation_error(
                "phone_number",
                "A cooperative with this phone number already exists",
            ));
        }
        self.put_cooperative(cooperative).await
    }

    pub async fn put_cooperative(&self, cooperative: &Cooperative) -> Result<(), AppError> {
        let json = Self::to_json(cooperative)?;
        Ok(self
            .store
            .set(&StoreKeys::cooperative_by_id(&cooperative.id), &json)
            .await?)
    }

    /// Loads a cooperative with its farmer list taken from the membership set.
    pub async fn get_cooperative(&self, cooperative_id: &str) -> Result<Option<Cooperative>, AppError> {
        let Some(mut cooperative) = self
            .get_json::<Cooperative>(&StoreKeys::cooperative_by_id(cooperative_id))
            .await?
        else {
            return Ok(None);
        };
        cooperative.farmer_ids = self
            .store
            .smembers(&StoreKeys::farmers_by_cooperative(cooperative_id))
            .await?;
        Ok(Some(cooperative))
    }

    pub async fn get_cooperative_id_by_phone(&self, phone: &str) -> Result<Option<String>, AppError> {
        Ok(self.store.get(&StoreKeys::cooperative_by_phone(phone)).await?)
    }

    pub async fn add_farmer(&self, farmer: &Farmer) -> Result<(), AppError> {
        let json = Self::to_json(farmer)?;
        self.store.set(&StoreKeys::farmer_by_id(&farmer.id), &json).await?;
        self.store
            .sadd(&StoreKeys::farmers_by_cooperative(&farmer.cooperative_id), &farmer.id)
            .await?;
        Ok(())
    }

    pub async fn get_farmer(&self, farmer_id: &str) -> Result<Option<Farmer>, AppError> {
        self.get_json(&StoreKeys::farmer_by_id(farmer_id)).await
    }

    pub async fn health_check(&self) -> Result<bool, AppError> {
        self.store.get(&StoreKey::Simple("health".to_string())).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver::fixtures::verified_driver;
    use crate::models::trip::fixtures::pending_trip;

    #[test]
    fn test_key_rendering() {
        assert_eq!(StoreKeys::trip_by_id("trp-1").render(), "trip:id:trp-1");
        assert_eq!(StoreKeys::trips_by_driver("drv-1").render(), "trips:driver:drv-1");
        assert_eq!(StoreKeys::all_trips().render(), "trips:all");
    }

    #[tokio::test]
    async fn test_create_trip_refuses_duplicates() {
        let store = StoreService::new_memory();
        let trip = pending_trip();

        store.create_trip(&trip).await.unwrap();
        assert!(matches!(store.create_trip(&trip).await, Err(AppError::Conflict(_))));

        let ids = store
            .get_trip_ids(&StoreKeys::trips_by_cooperative(&trip.cooperative_id))
            .await
            .unwrap();
        assert_eq!(ids, vec![trip.id.clone()]);
    }

    #[tokio::test]
    async fn test_save_trip_detects_stale_version() {
        let store = StoreService::new_memory();
        let mut trip = pending_trip();
        store.create_trip(&trip).await.unwrap();

        let base = trip.version;
        trip.version += 1;
        trip.driver_id = Some("drv-251018-d0001".to_string());
        store.save_trip(&trip, base).await.unwrap();

        // A writer still holding the old version loses
        let mut stale = pending_trip();
        stale.version = base + 1;
        assert!(matches!(store.save_trip(&stale, base).await, Err(AppError::Conflict(_))));

        let stored = store.get_trip(&trip.id).await.unwrap().unwrap();
        assert_eq!(stored.version, base + 1);
        assert_eq!(stored.driver_id.as_deref(), Some("drv-251018-d0001"));

        let driver_trips = store
            .get_trip_ids(&StoreKeys::trips_by_driver("drv-251018-d0001"))
            .await
            .unwrap();
        assert_eq!(driver_trips, vec![trip.id.clone()]);
    }

    #[tokio::test]
    async fn test_save_missing_trip_is_not_found() {
        let store = StoreService::new_memory();
        let trip = pending_trip();
        assert!(matches!(store.save_trip(&trip, 1).await, Err(AppError::TripNotFound(_))));
    }

    #[tokio::test]
    async fn test_save_driver_detects_stale_version() {
        let store = StoreService::new_memory();
        let driver = verified_driver("drv-251018-d0001", "+250788000001");
        store.create_driver(&driver).await.unwrap();

        let mut moved = driver.clone();
        moved.is_available = false;
        moved.version = 2;
        store.save_driver(&moved, 1).await.unwrap();

        let mut stale = driver.clone();
        stale.is_verified = false;
        stale.version = 2;
        assert!(matches!(store.save_driver(&stale, 1).await, Err(AppError::Conflict(_))));

        let stored = store.get_driver(&driver.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.is_verified);
        assert!(!stored.is_available);

        let unknown = verified_driver("drv-251018-d0009", "+250788000009");
        assert!(matches!(store.save_driver(&unknown, 1).await, Err(AppError::DriverNotFound(_))));
    }

    #[tokio::test]
    async fn test_unversioned_document_matches_version_zero() {
        let store = MemoryStore::new();
        let key = StoreKeys::driver_by_id("drv-251018-d0001");
        store.set(&key, r#"{"id":"drv-251018-d0001"}"#).await.unwrap();

        assert_eq!(store.compare_and_set(&key, 1, "{}").await.unwrap(), CasOutcome::VersionMismatch);
        assert_eq!(store.compare_and_set(&key, 0, r#"{"version":1}"#).await.unwrap(), CasOutcome::Applied);
    }

    #[tokio::test]
    async fn test_memory_sets() {
        let store = MemoryStore::new();
        let key = StoreKey::Simple("s".to_string());
        store.sadd(&key, "b").await.unwrap();
        store.sadd(&key, "a").await.unwrap();
        store.sadd(&key, "a").await.unwrap();
        assert_eq!(store.smembers(&key).await.unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.smembers(&StoreKey::Simple("empty".to_string())).await.unwrap().is_empty());
    }
}
