// src/services/messaging_service.rs
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing;

use crate::{
    errors::HaulageError as AppError,
    models::{actor::Actor, driver::Driver, trip::Trip},
    services::store_service::StoreService,
};

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub fcm_server_key: String,
    pub fcm_url: String,
    pub timeout: Duration,
}

impl FcmConfig {
    pub fn with_server_key(fcm_server_key: String) -> Self {
        Self {
            fcm_server_key,
            fcm_url: "https://fcm.googleapis.com/fcm/send".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    pub priority: NotificationPriority,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum NotificationPriority {
    Normal,
    #[default]
    High, // Will wake sleeping devices
}

impl NotificationMessage {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            data: None,
            priority: NotificationPriority::default(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

fn trip_data(trip: &Trip, kind: &str) -> serde_json::Value {
    json!({
        "type": kind,
        "trip_id": trip.id,
        "tracking_code": trip.tracking_code,
        "status": trip.status_label(),
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Counterpart notifications for trip events.
///
/// Delivery is best effort: callers log failures and move on.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_to_device(&self, device_token: &str, message: NotificationMessage) -> Result<(), AppError>;
    async fn send_to_driver(&self, driver_id: &str, message: NotificationMessage) -> Result<(), AppError>;
    async fn send_to_cooperative(&self, cooperative_id: &str, message: NotificationMessage) -> Result<(), AppError>;

    async fn notify_trip_accepted(&self, trip: &Trip, driver: &Driver) -> Result<(), AppError> {
        let message = NotificationMessage::new(
            "Transport Accepted",
            &format!(
                "{} ({}) accepted trip {} from {} to {}",
                driver.name, driver.plate_number, trip.tracking_code, trip.pickup.address, trip.destination.address
            ),
        )
        .with_data(json!({
            "type": "trip_accepted",
            "trip_id": trip.id,
            "driver_id": driver.id,
            "driver_phone": driver.phone_number,
            "total": trip.pricing.total,
        }));

        self.send_to_cooperative(&trip.cooperative_id, message).await
    }

    async fn notify_trip_rejected(&self, trip: &Trip) -> Result<(), AppError> {
        let reason = trip.rejection_reason.as_deref().unwrap_or("no reason given");
        let message = NotificationMessage::new(
            "Transport Declined",
            &format!("Trip {} was declined: {}", trip.tracking_code, reason),
        )
        .with_data(trip_data(trip, "trip_rejected"));

        self.send_to_cooperative(&trip.cooperative_id, message).await
    }

    async fn notify_pickup_confirmed(&self, trip: &Trip) -> Result<(), AppError> {
        let weight = trip.pickup_evidence.as_ref().map(|e| e.weight_kg).unwrap_or(trip.weight_kg);
        let message = NotificationMessage::new(
            "Crops Picked Up",
            &format!("Trip {} is on the way with {} kg", trip.tracking_code, weight),
        )
        .with_data(trip_data(trip, "pickup_confirmed"))
        .with_priority(NotificationPriority::Normal);

        self.send_to_cooperative(&trip.cooperative_id, message).await
    }

    async fn notify_delivery_confirmed(&self, trip: &Trip) -> Result<(), AppError> {
        let message = NotificationMessage::new(
            "Delivery Completed",
            &format!(
                "Trip {} delivered to {}. Payment of {} released",
                trip.tracking_code, trip.destination.address, trip.pricing.total
            ),
        )
        .with_data(trip_data(trip, "delivery_confirmed"));

        self.send_to_cooperative(&trip.cooperative_id, message).await
    }

    /// Tells the other parties of the trip; the actor who raised it is skipped.
    async fn notify_dispute_raised(&self, trip: &Trip, raised_by: &Actor) -> Result<(), AppError> {
        let reason = trip.open_dispute().map(|d| d.reason.as_str()).unwrap_or_default();
        let message = NotificationMessage::new(
            "Dispute Raised",
            &format!("A dispute was raised on trip {}: {}", trip.tracking_code, reason),
        )
        .with_data(trip_data(trip, "dispute_raised"));

        if !matches!(raised_by, Actor::CooperativeOfficer(id) if *id == trip.cooperative_id) {
            self.send_to_cooperative(&trip.cooperative_id, message.clone()).await?;
        }
        if let Some(driver_id) = &trip.driver_id {
            if !matches!(raised_by, Actor::Driver(id) if id == driver_id) {
                self.send_to_driver(driver_id, message).await?;
            }
        }
        Ok(())
    }

    async fn notify_dispute_resolved(&self, trip: &Trip) -> Result<(), AppError> {
        let message = NotificationMessage::new(
            "Dispute Closed",
            &format!("The dispute on trip {} has been closed", trip.tracking_code),
        )
        .with_data(trip_data(trip, "dispute_resolved"))
        .with_priority(NotificationPriority::Normal);

        self.send_to_cooperative(&trip.cooperative_id, message.clone()).await?;
        if let Some(driver_id) = &trip.driver_id {
            self.send_to_driver(driver_id, message).await?;
        }
        Ok(())
    }
}

pub struct FcmNotificationService {
    config: FcmConfig,
    client: reqwest::Client,
    store_service: Arc<StoreService>,
}

impl FcmNotificationService {
    pub fn new(config: FcmConfig, store_service: Arc<StoreService>) -> Result<Self, AppError> {
        // A stalled push must not hold a trip transition's response open
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            client,
            store_service,
        })
    }

    async fn get_driver_device_token(&self, driver_id: &str) -> Result<String, AppError> {
        let driver = self
            .store_service
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| AppError::driver_not_found(driver_id))?;
        driver
            .device_token
            .ok_or_else(|| AppError::FcmInvalidToken("Driver has no device token".to_string()))
    }

    async fn get_cooperative_device_token(&self, cooperative_id: &str) -> Result<String, AppError> {
        let cooperative = self
            .store_service
            .get_cooperative(cooperative_id)
            .await?
            .ok_or_else(|| AppError::cooperative_not_found(cooperative_id))?;
        cooperative
            .device_token
            .ok_or_else(|| AppError::FcmInvalidToken("Cooperative has no device token".to_string()))
    }
}

#[async_trait]
impl NotificationService for FcmNotificationService {
    async fn send_to_device(&self, device_token: &str, message: NotificationMessage) -> Result<(), AppError> {
        if device_token.is_empty() {
            return Err(AppError::FcmInvalidToken("Empty device token".to_string()));
        }

        tracing::info!("Sending FCM notification to device: {}", device_token);

        let mut data = message.data.unwrap_or_else(|| json!({}));
        data["notification_id"] = json!(uuid::Uuid::new_v4().to_string());

        let fcm_message = json!({
            "to": device_token,
            "notification": {
                "title": message.title,
                "body": message.body,
                "sound": "default"
            },
            "priority": match message.priority {
                NotificationPriority::High => "high",
                NotificationPriority::Normal => "normal",
            },
            "data": data,
        });

        let response = self
            .client
            .post(&self.config.fcm_url)
            .header("Authorization", format!("key={}", self.config.fcm_server_key))
            .header("Content-Type", "application/json")
            .json(&fcm_message)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("FCM request failed: {}", error_text);
            return Err(AppError::FcmDelivery(error_text));
        }

        tracing::debug!("FCM notification sent successfully");
        Ok(())
    }

    async fn send_to_driver(&self, driver_id: &str, message: NotificationMessage) -> Result<(), AppError> {
        let device_token = self.get_driver_device_token(driver_id).await?;
        self.send_to_device(&device_token, message).await
    }

    async fn send_to_cooperative(&self, cooperative_id: &str, message: NotificationMessage) -> Result<(), AppError> {
        let device_token = self.get_cooperative_device_token(cooperative_id).await?;
        self.send_to_device(&device_token, message).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    Device(String),
    Driver(String),
    Cooperative(String),
}

/// Messages kept by the mock; older ones are dropped first.
pub const MOCK_HISTORY_LIMIT: usize = 256;

// Mock service for development and testing
#[derive(Debug, Default)]
pub struct MockNotificationService {
    sent: Mutex<VecDeque<(Recipient, NotificationMessage)>>,
}

impl MockNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent messages "sent", oldest first.
    pub fn sent(&self) -> Vec<(Recipient, NotificationMessage)> {
        self.sent
            .lock()
            .map(|sent| sent.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, recipient: Recipient, message: NotificationMessage) {
        if let Ok(mut sent) = self.sent.lock() {
            if sent.len() == MOCK_HISTORY_LIMIT {
                sent.pop_front();
            }
            sent.push_back((recipient, message));
        }
    }
}

#[async_trait]
impl NotificationService for MockNotificationService {
    async fn send_to_device(&self, device_token: &str, message: NotificationMessage) -> Result<(), AppError> {
        tracing::info!("[MOCK] Would send FCM to {}: {} - {}", device_token, message.title, message.body);
        self.record(Recipient::Device(device_token.to_string()), message);
        Ok(())
    }

    async fn send_to_driver(&self, driver_id: &str, message: NotificationMessage) -> Result<(), AppError> {
        tracing::info!("[MOCK] Would send to driver {}: {} - {}", driver_id, message.title, message.body);
        self.record(Recipient::Driver(driver_id.to_string()), message);
        Ok(())
    }

    async fn send_to_cooperative(&self, cooperative_id: &str, message: NotificationMessage) -> Result<(), AppError> {
        tracing::info!(
            "[MOCK] Would send to cooperative {}: {} - {}",
            cooperative_id,
            message.title,
            message.body
        );
        self.record(Recipient::Cooperative(cooperative_id.to_string()), message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{Dispute, fixtures::pending_trip};

    fn delivered_trip_with_dispute() -> Trip {
        let mut trip = pending_trip();
        trip.driver_id = Some("drv-251018-d0001".to_string());
        trip.disputes.push(Dispute {
            reason: "Two sacks missing".to_string(),
            raised_by: "cooperative:cop-251018-c00p1".to_string(),
            raised_at: Utc::now(),
            outcome: None,
            resolved_by: None,
            resolved_at: None,
        });
        trip
    }

    #[tokio::test]
    async fn test_rejection_goes_to_cooperative() {
        let mock = MockNotificationService::new();
        let mut trip = pending_trip();
        trip.rejection_reason = Some("Truck is full".to_string());

        mock.notify_trip_rejected(&trip).await.unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Recipient::Cooperative(trip.cooperative_id.clone()));
        assert!(sent[0].1.body.contains("Truck is full"));
    }

    #[tokio::test]
    async fn test_dispute_skips_the_raiser() {
        let mock = MockNotificationService::new();
        let trip = delivered_trip_with_dispute();

        mock.notify_dispute_raised(&trip, &Actor::CooperativeOfficer(trip.cooperative_id.clone()))
            .await
            .unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Recipient::Driver("drv-251018-d0001".to_string()));
        assert!(sent[0].1.body.contains("Two sacks missing"));
    }

    #[tokio::test]
    async fn test_admin_dispute_reaches_both_parties() {
        let mock = MockNotificationService::new();
        let trip = delivered_trip_with_dispute();

        mock.notify_dispute_raised(&trip, &Actor::Admin("ops".to_string())).await.unwrap();
        assert_eq!(mock.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_fcm_without_token_fails() {
        let store = Arc::new(StoreService::new_memory());
        let fcm = FcmNotificationService::new(FcmConfig::with_server_key("key".to_string()), store).unwrap();

        let result = fcm.send_to_device("", NotificationMessage::new("t", "b")).await;
        assert!(matches!(result, Err(AppError::FcmInvalidToken(_))));

        let result = fcm.send_to_driver("drv-251018-zzzzz", NotificationMessage::new("t", "b")).await;
        assert!(matches!(result, Err(AppError::DriverNotFound(_))));
    }

    #[tokio::test]
    async fn test_mock_history_is_bounded() {
        let mock = MockNotificationService::new();
        for n in 0..MOCK_HISTORY_LIMIT + 10 {
            mock.send_to_device(&format!("device-{}", n), NotificationMessage::new("t", "b"))
                .await
                .unwrap();
        }

        let sent = mock.sent();
        assert_eq!(sent.len(), MOCK_HISTORY_LIMIT);
        assert_eq!(sent[0].0, Recipient::Device("device-10".to_string()));
        assert_eq!(
            sent[MOCK_HISTORY_LIMIT - 1].0,
            Recipient::Device(format!("device-{}", MOCK_HISTORY_LIMIT + 9))
        );
    }

    #[tokio::test]
    async fn test_unreachable_fcm_endpoint_fails_within_timeout() {
        let store = Arc::new(StoreService::new_memory());
        let config = FcmConfig {
            // Non-routable address: the connect attempt hangs until the client gives up
            fcm_url: "http://10.255.255.1/fcm/send".to_string(),
            timeout: Duration::from_millis(200),
            ..FcmConfig::with_server_key("key".to_string())
        };
        let fcm = FcmNotificationService::new(config, store).unwrap();

        let started = std::time::Instant::now();
        let result = fcm.send_to_device("token", NotificationMessage::new("t", "b")).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
