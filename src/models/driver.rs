// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trip::GeoPoint;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DriverLocation {
    pub point: GeoPoint,
    pub heading: Option<f64>,   // Direction in degrees (0-360)
    pub speed: Option<f64>,     // Speed in km/h
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    pub pin: String,
    pub plate_number: String,
    pub capacity_kg: f64,
    pub is_verified: bool,
    pub is_available: bool,
    pub rating: f32,
    pub cooperative_id: Option<String>,
    pub current_location: Option<DriverLocation>,
    pub device_token: Option<String>,
    /// Bumped on every profile write, like `Trip::version`.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverRegistration {
    pub name: String,
    pub phone_number: String,
    pub pin: String,
    pub plate_number: String,
    pub capacity_kg: f64,
    pub cooperative_id: Option<String>,
    pub device_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverAvailabilityUpdate {
    pub is_available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverLocationUpdate {
    pub point: GeoPoint,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinLogin {
    pub phone_number: String,
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriverResponse {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    pub plate_number: String,
    pub capacity_kg: f64,
    pub is_verified: bool,
    pub is_available: bool,
    pub rating: f32,
    pub cooperative_id: Option<String>,
    pub current_location: Option<DriverLocation>,
}

impl From<Driver> for DriverResponse {
    fn from(driver: Driver) -> Self {
        Self {
            id: driver.id,
            name: driver.name,
            phone_number: driver.phone_number,
            plate_number: driver.plate_number,
            capacity_kg: driver.capacity_kg,
            is_verified: driver.is_verified,
            is_available: driver.is_available,
            rating: driver.rating,
            cooperative_id: driver.cooperative_id,
            current_location: driver.current_location,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn verified_driver(id: &str, phone_number: &str) -> Driver {
        let now = Utc::now();
        Driver {
            id: id.to_string(),
            name: "Jean Bosco".to_string(),
            phone_number: phone_number.to_string(),
            pin: "1234".to_string(),
            plate_number: "RAB 123C".to_string(),
            capacity_kg: 5000.0,
            is_verified: true,
            is_available: true,
            rating: 4.6,
            cooperative_id: None,
            current_location: None,
            device_token: Some(format!("token-{}", id)),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
