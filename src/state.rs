// src/state.rs
use std::sync::Arc;

use crate::{
    errors::HaulageError as AppError,
    services::{
        cooperative_service::CooperativeService,
        driver_service::DriverService,
        geocoding_service::{GeocoderConfig, GeocodingService, NominatimGeocoder},
        messaging_service::{FcmConfig, FcmNotificationService, MockNotificationService, NotificationService},
        store_service::StoreService,
        trip_service::{DEFAULT_VARIANCE_THRESHOLD, TripService},
    },
};

pub struct AppState {
    pub trip_service: Arc<TripService>,
    pub driver_service: Arc<DriverService>,
    pub cooperative_service: Arc<CooperativeService>,
    pub store_service: Arc<StoreService>,
    pub notification_service: Arc<dyn NotificationService>,
    pub config: AppConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub redis_url: Option<String>,
    pub fcm_server_key: Option<String>,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub variance_threshold: f64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let geocoder_defaults = GeocoderConfig::default();

        let variance_threshold = match get("WEIGHT_VARIANCE_THRESHOLD") {
            Some(raw) => {
                let value: f64 = raw.parse().map_err(|_| {
                    AppError::InvalidConfiguration(format!("WEIGHT_VARIANCE_THRESHOLD is not a number: {}", raw))
                })?;
                if !(value > 0.0 && value < 1.0) {
                    return Err(AppError::InvalidConfiguration(format!(
                        "WEIGHT_VARIANCE_THRESHOLD must be between 0 and 1, got {}",
                        value
                    )));
                }
                value
            }
            None => DEFAULT_VARIANCE_THRESHOLD,
        };

        let redis_url = get("REDIS_URL");
        if let Some(url) = &redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(AppError::InvalidConfiguration(format!("REDIS_URL has an unknown scheme: {}", url)));
            }
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            redis_url,
            fcm_server_key: get("FCM_SERVER_KEY"),
            geocoder_url: get("GEOCODER_URL").unwrap_or(geocoder_defaults.base_url),
            geocoder_user_agent: get("GEOCODER_USER_AGENT").unwrap_or(geocoder_defaults.user_agent),
            variance_threshold,
        })
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        let store_service = Arc::new(match &config.redis_url {
            Some(url) => StoreService::new(url).await?,
            None => {
                tracing::warn!("REDIS_URL not set, trips are kept in memory only");
                StoreService::new_memory()
            }
        });

        let notification_service: Arc<dyn NotificationService> = match &config.fcm_server_key {
            Some(key) => Arc::new(FcmNotificationService::new(
                FcmConfig::with_server_key(key.clone()),
                store_service.clone(),
            )?),
            None => {
                tracing::warn!("FCM_SERVER_KEY not set, using mock notification service");
                Arc::new(MockNotificationService::new())
            }
        };

        let geocoder: Arc<dyn GeocodingService> = Arc::new(NominatimGeocoder::new(GeocoderConfig {
            base_url: config.geocoder_url.trim_end_matches('/').to_string(),
            user_agent: config.geocoder_user_agent.clone(),
            ..Default::default()
        })?);

        let trip_service = Arc::new(TripService::new(
            store_service.clone(),
            geocoder,
            notification_service.clone(),
            config.variance_threshold,
        ));
        let driver_service = Arc::new(DriverService::new(store_service.clone()));
        let cooperative_service = Arc::new(CooperativeService::new(store_service.clone()));

        Ok(Self {
            trip_service,
            driver_service,
            cooperative_service,
            store_service,
            notification_service,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(config.redis_url.is_none());
        assert!(config.fcm_server_key.is_none());
        assert_eq!(config.variance_threshold, 0.05);
        assert!(config.geocoder_url.contains("nominatim"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config(&[("REDIS_URL", "  "), ("FCM_SERVER_KEY", "")]).unwrap();
        assert!(config.redis_url.is_none());
        assert!(config.fcm_server_key.is_none());
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(matches!(
            config(&[("WEIGHT_VARIANCE_THRESHOLD", "five")]),
            Err(AppError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            config(&[("WEIGHT_VARIANCE_THRESHOLD", "1.5")]),
            Err(AppError::InvalidConfiguration(_))
        ));
        assert_eq!(
            config(&[("WEIGHT_VARIANCE_THRESHOLD", "0.1")]).unwrap().variance_threshold,
            0.1
        );
    }

    #[test]
    fn test_invalid_redis_scheme() {
        assert!(matches!(
            config(&[("REDIS_URL", "http://localhost")]),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_state_without_redis_or_fcm() {
        let state = AppState::new(config(&[]).unwrap()).await.unwrap();
        assert!(state.store_service.health_check().await.unwrap());
    }
}
