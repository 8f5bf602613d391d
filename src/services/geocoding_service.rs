// src/services/geocoding_service.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing;

use crate::{
    errors::HaulageError as AppError,
    models::trip::{GeoPoint, Location, LocationInput},
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("No match for address: {0}")]
    NotFound(String),

    #[error("Geocoder unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub address: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "haulage-realtime/0.1".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Place, GeocodeError>;
    async fn reverse(&self, point: &GeoPoint) -> Result<String, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
    error: Option<String>,
}

pub struct NominatimGeocoder {
    config: GeocoderConfig,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn unavailable(error: reqwest::Error) -> GeocodeError {
        GeocodeError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl GeocodingService for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Place, GeocodeError> {
        tracing::debug!("Geocoding address: {}", address);

        let response = self
            .client
            .get(format!("{}/search", self.config.base_url))
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(GeocodeError::Unavailable(format!("HTTP {}", response.status())));
        }

        let places: Vec<NominatimPlace> = response.json().await.map_err(Self::unavailable)?;
        let Some(place) = places.into_iter().next() else {
            return Err(GeocodeError::NotFound(address.to_string()));
        };

        let point = match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
            (Ok(latitude), Ok(longitude)) => GeoPoint::new(latitude, longitude),
            _ => {
                return Err(GeocodeError::Unavailable(format!(
                    "Malformed coordinates in geocoder reply: {}, {}",
                    place.lat, place.lon
                )));
            }
        };

        Ok(Place {
            address: place.display_name,
            point,
        })
    }

    async fn reverse(&self, point: &GeoPoint) -> Result<String, GeocodeError> {
        let latitude = point.latitude.to_string();
        let longitude = point.longitude.to_string();

        let response = self
            .client
            .get(format!("{}/reverse", self.config.base_url))
            .query(&[("lat", latitude.as_str()), ("lon", longitude.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(GeocodeError::Unavailable(format!("HTTP {}", response.status())));
        }

        let reply: NominatimReverse = response.json().await.map_err(Self::unavailable)?;
        match (reply.display_name, reply.error) {
            (Some(name), _) => Ok(name),
            (None, error) => Err(GeocodeError::NotFound(
                error.unwrap_or_else(|| format!("{}, {}", latitude, longitude)),
            )),
        }
    }
}

/// Fixed lookup table, used for development and tests.
#[derive(Debug, Default)]
pub struct StaticGeocoder {
    // Normalized lookup key to display name and point
    places: HashMap<String, (String, GeoPoint)>,
    offline: bool,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, address: &str, point: GeoPoint) -> Self {
        self.places
            .insert(Self::normalize(address), (address.trim().to_string(), point));
        self
    }

    /// Every lookup reports the geocoder as unavailable.
    pub fn offline() -> Self {
        Self {
            places: HashMap::new(),
            offline: true,
        }
    }

    fn normalize(address: &str) -> String {
        address.trim().to_lowercase()
    }
}

#[async_trait]
impl GeocodingService for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<Place, GeocodeError> {
        if self.offline {
            return Err(GeocodeError::Unavailable("static geocoder offline".to_string()));
        }
        self.places
            .get(&Self::normalize(address))
            .map(|(name, point)| Place {
                address: name.clone(),
                point: *point,
            })
            .ok_or_else(|| GeocodeError::NotFound(address.to_string()))
    }

    async fn reverse(&self, point: &GeoPoint) -> Result<String, GeocodeError> {
        if self.offline {
            return Err(GeocodeError::Unavailable("static geocoder offline".to_string()));
        }
        self.places
            .values()
            .find(|(_, p)| p == point)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| GeocodeError::NotFound(format!("{}, {}", point.latitude, point.longitude)))
    }
}

/// Turns user input into a location with coordinates, or explains why it can't.
pub async fn resolve_location(
    geocoder: &dyn GeocodingService,
    field: &str,
    input: &LocationInput,
) -> Result<Location, AppError> {
    let address = input.address.trim();

    if let Some(point) = input.coordinates {
        if !point.is_valid() {
            return Err(AppError::invalid_field(
                field,
                format!("{}, {}", point.latitude, point.longitude),
                "coordinates out of range",
            ));
        }
        if !address.is_empty() {
            return Ok(Location {
                address: address.to_string(),
                coordinates: Some(point),
            });
        }

        // Address is cosmetic once we have coordinates
        let address = match geocoder.reverse(&point).await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Reverse geocoding failed for {}: {}", field, e);
                format!("{:.5}, {:.5}", point.latitude, point.longitude)
            }
        };
        return Ok(Location {
            address,
            coordinates: Some(point),
        });
    }

    if address.is_empty() {
        return Err(AppError::MissingRequiredField(field.to_string()));
    }

    match geocoder.geocode(address).await {
        // Keep the geocoder's canonical name rather than what was typed
        Ok(place) => Ok(Location {
            address: place.address,
            coordinates: Some(place.point),
        }),
        Err(GeocodeError::NotFound(_)) => Err(AppError::LocationNotFound {
            field: field.to_string(),
            address: address.to_string(),
        }),
        Err(GeocodeError::Unavailable(reason)) => {
            tracing::warn!("Geocoder unavailable while resolving {}: {}", field, reason);
            Err(AppError::DistancePending {
                field: field.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocoder() -> StaticGeocoder {
        StaticGeocoder::new()
            .with_place("Musanze", GeoPoint::new(-1.4998, 29.6344))
            .with_place("Kigali", GeoPoint::new(-1.9441, 30.0619))
    }

    fn input(address: &str, coordinates: Option<GeoPoint>) -> LocationInput {
        LocationInput {
            address: address.to_string(),
            coordinates,
        }
    }

    #[tokio::test]
    async fn test_static_lookup_is_case_insensitive() {
        let place = geocoder().geocode("  kigali ").await.unwrap();
        assert_eq!(place.point, GeoPoint::new(-1.9441, 30.0619));
        assert!(matches!(geocoder().geocode("Atlantis").await, Err(GeocodeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_prefers_given_coordinates() {
        let point = GeoPoint::new(-2.0, 30.0);
        let location = resolve_location(&geocoder(), "pickup", &input("Farm gate", Some(point)))
            .await
            .unwrap();
        assert_eq!(location.address, "Farm gate");
        assert_eq!(location.coordinates, Some(point));
    }

    #[tokio::test]
    async fn test_resolve_fills_address_from_reverse_lookup() {
        let point = GeoPoint::new(-1.4998, 29.6344);
        let location = resolve_location(&geocoder(), "pickup", &input("", Some(point)))
            .await
            .unwrap();
        assert_eq!(location.address, "Musanze");
    }

    #[tokio::test]
    async fn test_resolve_keeps_canonical_place_name() {
        let geocoder = StaticGeocoder::new().with_place("Musanze, Northern Province, Rwanda", GeoPoint::new(-1.4998, 29.6344));
        let location = resolve_location(&geocoder, "pickup", &input("  musanze, northern province, rwanda ", None))
            .await
            .unwrap();
        assert_eq!(location.address, "Musanze, Northern Province, Rwanda");
        assert_eq!(location.coordinates, Some(GeoPoint::new(-1.4998, 29.6344)));
    }

    #[tokio::test]
    async fn test_unknown_address_is_location_not_found() {
        let err = resolve_location(&geocoder(), "destination", &input("Atlantis", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LocationNotFound { ref field, .. } if field == "destination"));
    }

    #[tokio::test]
    async fn test_offline_geocoder_is_distance_pending() {
        let err = resolve_location(&StaticGeocoder::offline(), "pickup", &input("Kigali", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DistancePending { ref field } if field == "pickup"));
    }

    #[tokio::test]
    async fn test_missing_address_and_coordinates() {
        let err = resolve_location(&geocoder(), "pickup", &input("  ", None)).await.unwrap_err();
        assert!(matches!(err, AppError::MissingRequiredField(ref f) if f == "pickup"));

        let err = resolve_location(&geocoder(), "pickup", &input("x", Some(GeoPoint::new(95.0, 0.0))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFieldValue { .. }));
    }
}
