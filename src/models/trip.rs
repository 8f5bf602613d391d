// src/models/trip.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,   // Created by a cooperative officer, waiting for a driver
    Accepted,  // Claimed by a driver, not yet loaded
    InTransit, // Loaded at pickup, on the road
    Delivered, // Unloaded at destination, payment released
    Rejected,  // Turned down by a driver before pickup
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Accepted => "accepted",
            TripStatus::InTransit => "in_transit",
            TripStatus::Delivered => "delivered",
            TripStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub address: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pricing {
    pub price_per_kg: f64,
    pub price_per_km: f64,
    pub weight_kg: f64,
    pub distance_km: f64,
    pub total: f64,
    pub locked_at: DateTime<Utc>,
}

/// Photo, scale reading and position captured at pickup or delivery.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Evidence {
    pub photo_uri: String,
    pub weight_kg: f64,
    pub gps: Option<GeoPoint>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DisputeOutcome {
    Resolved,
    Rejected { note: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Dispute {
    pub reason: String,
    pub raised_by: String,
    pub raised_at: DateTime<Utc>,
    pub outcome: Option<DisputeOutcome>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Trip {
    pub id: String,
    pub tracking_code: String,
    pub cooperative_id: String,
    pub driver_id: Option<String>,
    pub farmer_ids: Vec<String>,
    pub status: TripStatus,

    // Logistics
    pub pickup: Location,
    pub destination: Location,
    pub crops: Vec<String>,
    pub weight_kg: f64,

    pub pricing: Pricing,

    pub pickup_evidence: Option<Evidence>,
    pub delivery_evidence: Option<Evidence>,
    pub variance_overridden: bool,

    pub payment_released: bool,
    pub payment_released_at: Option<DateTime<Utc>>,

    // Every dispute ever raised, the last one may still be open
    pub disputes: Vec<Dispute>,

    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    /// Bumped on every write; storage refuses a save whose base version is stale.
    pub version: u64,
}

impl Trip {
    pub fn open_dispute(&self) -> Option<&Dispute> {
        self.disputes.last().filter(|dispute| dispute.is_open())
    }

    pub fn is_disputed(&self) -> bool {
        self.open_dispute().is_some()
    }

    /// Status as shown to users: an open dispute overrides the principal state.
    pub fn status_label(&self) -> &'static str {
        if self.is_disputed() {
            "disputed"
        } else {
            self.status.as_str()
        }
    }

    /// Pickup scale reading against the weight the cooperative requested.
    pub fn pickup_variance(&self) -> Option<f64> {
        self.pickup_evidence
            .as_ref()
            .and_then(|pickup| crate::services::pricing::weight_variance(self.weight_kg, pickup.weight_kg))
    }

    /// Delivery scale reading against the pickup reading, falling back to the requested weight.
    pub fn delivery_variance(&self) -> Option<f64> {
        let delivery = self.delivery_evidence.as_ref()?;
        let baseline = self
            .pickup_evidence
            .as_ref()
            .map(|pickup| pickup.weight_kg)
            .unwrap_or(self.weight_kg);
        crate::services::pricing::weight_variance(baseline, delivery.weight_kg)
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocationInput {
    #[serde(default)]
    pub address: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripRequest {
    pub cooperative_id: String,
    #[serde(default)]
    pub farmer_ids: Vec<String>,
    pub pickup: LocationInput,
    pub destination: LocationInput,
    pub crops: Vec<String>,
    pub weight_kg: f64,
    pub price_per_kg: f64,
    pub price_per_km: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripEstimateRequest {
    pub pickup: LocationInput,
    pub destination: LocationInput,
    pub weight_kg: f64,
    pub price_per_kg: f64,
    pub price_per_km: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripEstimate {
    pub pickup: Location,
    pub destination: Location,
    pub distance_km: f64,
    pub total: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RepriceRequest {
    pub price_per_kg: f64,
    pub price_per_km: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RejectionRequest {
    pub reason: Option<String>,
}

/// Evidence as submitted by the driver; fields are optional so absence can be reported by name.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EvidenceSubmission {
    pub photo_uri: Option<String>,
    pub weight_kg: Option<f64>,
    pub gps: Option<GeoPoint>,
    #[serde(default)]
    pub confirm_variance: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DisputeResolution {
    Resolve,
    Reject { note: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TripFilter {
    pub cooperative_id: Option<String>,
    pub driver_id: Option<String>,
    pub status: Option<TripStatus>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripResponse {
    pub id: String,
    pub tracking_code: String,
    pub cooperative_id: String,
    pub driver_id: Option<String>,
    pub farmer_ids: Vec<String>,
    pub status: TripStatus,
    pub status_label: String,
    pub disputed: bool,
    pub dispute_reason: Option<String>,
    pub pickup: Location,
    pub destination: Location,
    pub crops: Vec<String>,
    pub weight_kg: f64,
    pub pricing: Pricing,
    pub pickup_evidence: Option<Evidence>,
    pub delivery_evidence: Option<Evidence>,
    pub pickup_variance: Option<f64>,
    pub delivery_variance: Option<f64>,
    pub variance_overridden: bool,
    pub payment_released: bool,
    pub disputes: Vec<Dispute>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<Trip> for TripResponse {
    fn from(trip: Trip) -> Self {
        let pickup_variance = trip.pickup_variance();
        let delivery_variance = trip.delivery_variance();
        let disputed = trip.is_disputed();
        let dispute_reason = trip.open_dispute().map(|dispute| dispute.reason.clone());
        let status_label = trip.status_label().to_string();

        Self {
            id: trip.id,
            tracking_code: trip.tracking_code,
            cooperative_id: trip.cooperative_id,
            driver_id: trip.driver_id,
            farmer_ids: trip.farmer_ids,
            status: trip.status,
            status_label,
            disputed,
            dispute_reason,
            pickup: trip.pickup,
            destination: trip.destination,
            crops: trip.crops,
            weight_kg: trip.weight_kg,
            pricing: trip.pricing,
            pickup_evidence: trip.pickup_evidence,
            delivery_evidence: trip.delivery_evidence,
            pickup_variance,
            delivery_variance,
            variance_overridden: trip.variance_overridden,
            payment_released: trip.payment_released,
            disputes: trip.disputes,
            rejection_reason: trip.rejection_reason,
            notes: trip.notes,
            created_at: trip.created_at,
            accepted_at: trip.accepted_at,
            updated_at: trip.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn pending_trip() -> Trip {
        let now = Utc::now();
        Trip {
            id: "trp-251018-a1b2c".to_string(),
            tracking_code: "HL-TESTTEST".to_string(),
            cooperative_id: "cop-251018-c00p1".to_string(),
            driver_id: None,
            farmer_ids: Vec::new(),
            status: TripStatus::Pending,
            pickup: Location {
                address: "Musanze market".to_string(),
                coordinates: Some(GeoPoint::new(-1.4998, 29.6347)),
            },
            destination: Location {
                address: "Kigali depot".to_string(),
                coordinates: Some(GeoPoint::new(-1.9441, 30.0619)),
            },
            crops: vec!["potatoes".to_string()],
            weight_kg: 1000.0,
            pricing: Pricing {
                price_per_kg: 23.0,
                price_per_km: 50.0,
                weight_kg: 1000.0,
                distance_km: 15.0,
                total: 23_750.0,
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
            notes: None,
            created_at: now,
            accepted_at: None,
            updated_at: now,
            version: 1,
        }
    }

    pub fn evidence(weight_kg: f64) -> Evidence {
        Evidence {
            photo_uri: "file:///photos/scale.jpg".to_string(),
            weight_kg,
            gps: None,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TripStatus::InTransit).unwrap();
        assert_eq!(json, "\"in_transit\"");
        let parsed: TripStatus = serde_json::from_str("\"delivered\"").unwrap();
        assert_eq!(parsed, TripStatus::Delivered);
    }

    #[test]
    fn test_status_label_reflects_open_dispute() {
        let mut trip = pending_trip();
        trip.status = TripStatus::Delivered;
        assert_eq!(trip.status_label(), "delivered");

        trip.disputes.push(Dispute {
            reason: "short by 80kg".to_string(),
            raised_by: "cop-251018-c00p1".to_string(),
            raised_at: Utc::now(),
            outcome: None,
            resolved_by: None,
            resolved_at: None,
        });
        assert!(trip.is_disputed());
        assert_eq!(trip.status_label(), "disputed");

        trip.disputes[0].outcome = Some(DisputeOutcome::Resolved);
        assert!(!trip.is_disputed());
        assert_eq!(trip.status_label(), "delivered");
    }

    #[test]
    fn test_delivery_variance_uses_pickup_weight() {
        let mut trip = pending_trip();
        trip.pickup_evidence = Some(evidence(900.0));
        trip.delivery_evidence = Some(evidence(855.0));

        let variance = trip.delivery_variance().unwrap();
        assert!((variance - 0.05).abs() < 1e-9);
        assert!((trip.pickup_variance().unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_response_exposes_dispute_reason_only_while_open() {
        let mut trip = pending_trip();
        trip.status = TripStatus::Delivered;
        trip.disputes.push(Dispute {
            reason: "bags missing".to_string(),
            raised_by: "adm-1".to_string(),
            raised_at: Utc::now(),
            outcome: Some(DisputeOutcome::Rejected { note: "weights match".to_string() }),
            resolved_by: Some("adm-1".to_string()),
            resolved_at: Some(Utc::now()),
        });

        let response = TripResponse::from(trip);
        assert!(!response.disputed);
        assert_eq!(response.dispute_reason, None);
        assert_eq!(response.disputes.len(), 1);
    }
}
