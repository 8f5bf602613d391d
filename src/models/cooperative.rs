// src/models/cooperative.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trip::Location;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CooperativeStatus {
    Pending,
    Verified,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Cooperative {
    pub id: String,
    pub name: String,
    pub officer_name: String,
    pub phone_number: String,
    pub pin: String,
    pub status: CooperativeStatus,
    pub location: Location,
    pub farmer_ids: Vec<String>,
    pub device_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Farmer {
    pub id: String,
    pub cooperative_id: String,
    pub name: String,
    pub phone_number: String,
    pub location: String,
    pub crops: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CooperativeRegistration {
    pub name: String,
    pub officer_name: String,
    pub phone_number: String,
    pub pin: String,
    pub location: Location,
    pub device_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FarmerRegistration {
    pub name: String,
    pub phone_number: String,
    pub location: String,
    #[serde(default)]
    pub crops: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CooperativeResponse {
    pub id: String,
    pub name: String,
    pub officer_name: String,
    pub phone_number: String,
    pub status: CooperativeStatus,
    pub location: Location,
    pub farmer_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Cooperative> for CooperativeResponse {
    fn from(cooperative: Cooperative) -> Self {
        Self {
            id: cooperative.id,
            name: cooperative.name,
            officer_name: cooperative.officer_name,
            phone_number: cooperative.phone_number,
            status: cooperative.status,
            location: cooperative.location,
            farmer_ids: cooperative.farmer_ids,
            created_at: cooperative.created_at,
        }
    }
}
