use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for the haulage service
#[derive(Debug)]
pub enum HaulageError {
    // HTTP and API errors
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),

    // Storage errors
    RedisConnection(String),
    RedisQuery(String),
    StoreSerialization(String),

    // External service errors
    FcmDelivery(String),
    FcmInvalidToken(String),

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Lookup errors
    TripNotFound(String),
    DriverNotFound(String),
    CooperativeNotFound(String),
    FarmerNotFound(String),

    // Trip lifecycle errors
    InvalidTransition { from: String, action: String },
    MissingEvidence(String),
    WeightVarianceUnconfirmed { variance: f64, threshold: f64 },
    PriceLocked(String),
    TripAlreadyAssigned,
    DriverNotAvailable,
    DriverNotVerified,
    DriverCapacityExceeded { capacity_kg: f64, weight_kg: f64 },
    LocationNotFound { field: String, address: String },
    DistancePending { field: String },

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration and setup errors
    InvalidConfiguration(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for HaulageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaulageError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            HaulageError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            HaulageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            HaulageError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            HaulageError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            HaulageError::RedisConnection(msg) => write!(f, "Redis connection error: {}", msg),
            HaulageError::RedisQuery(msg) => write!(f, "Redis query error: {}", msg),
            HaulageError::StoreSerialization(msg) => write!(f, "Store serialization error: {}", msg),

            HaulageError::FcmDelivery(msg) => write!(f, "FCM delivery error: {}", msg),
            HaulageError::FcmInvalidToken(msg) => write!(f, "Invalid FCM token: {}", msg),

            HaulageError::NetworkTimeout => write!(f, "Network request timed out"),
            HaulageError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            HaulageError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),

            HaulageError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            HaulageError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            HaulageError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            HaulageError::TripNotFound(id) => write!(f, "Trip not found: {}", id),
            HaulageError::DriverNotFound(id) => write!(f, "Driver not found: {}", id),
            HaulageError::CooperativeNotFound(id) => write!(f, "Cooperative not found: {}", id),
            HaulageError::FarmerNotFound(id) => write!(f, "Farmer not found: {}", id),

            HaulageError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} a trip that is {}", action, from)
            }
            HaulageError::MissingEvidence(field) => write!(f, "Missing evidence: {}", field),
            HaulageError::WeightVarianceUnconfirmed { variance, threshold } => write!(
                f,
                "Weight variance of {:.1}% exceeds {:.1}% and must be confirmed",
                variance * 100.0,
                threshold * 100.0
            ),
            HaulageError::PriceLocked(id) => write!(f, "Price is locked for trip {}", id),
            HaulageError::TripAlreadyAssigned => write!(f, "Trip is already assigned to another driver"),
            HaulageError::DriverNotAvailable => write!(f, "Driver is not available"),
            HaulageError::DriverNotVerified => write!(f, "Driver is not verified"),
            HaulageError::DriverCapacityExceeded { capacity_kg, weight_kg } => write!(
                f,
                "Trip weight {} kg exceeds driver capacity {} kg",
                weight_kg, capacity_kg
            ),
            HaulageError::LocationNotFound { field, address } => {
                write!(f, "Location not found for {}: {}", field, address)
            }
            HaulageError::DistancePending { field } => {
                write!(f, "Distance is still being calculated for {}", field)
            }

            HaulageError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            HaulageError::MissingRequiredField(field) => write!(f, "Missing required field: {}", field),
            HaulageError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            HaulageError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for HaulageError {}

impl IntoResponse for HaulageError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            HaulageError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            HaulageError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            HaulageError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            HaulageError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),

            HaulageError::ValidationFailed(errors) => {
                let details = serde_json::to_value(&errors).ok();
                (StatusCode::BAD_REQUEST, "validation_failed", "Validation errors occurred".to_string(), details)
            }
            HaulageError::MissingRequiredField(field) => {
                (StatusCode::BAD_REQUEST, "missing_field", format!("Missing required field: {}", field), None)
            }
            HaulageError::InvalidFieldValue { field, value, reason } => {
                let details = Some(serde_json::json!({ "field": field, "value": value }));
                (StatusCode::BAD_REQUEST, "invalid_field", format!("Invalid value for {}: {}", field, reason), details)
            }
            HaulageError::MissingEvidence(field) => {
                let details = Some(serde_json::json!({ "field": field }));
                (StatusCode::BAD_REQUEST, "missing_evidence", format!("Missing evidence: {}", field), details)
            }

            HaulageError::TripNotFound(id) => (StatusCode::NOT_FOUND, "trip_not_found", format!("Trip not found: {}", id), None),
            HaulageError::DriverNotFound(id) => (StatusCode::NOT_FOUND, "driver_not_found", format!("Driver not found: {}", id), None),
            HaulageError::CooperativeNotFound(id) => {
                (StatusCode::NOT_FOUND, "cooperative_not_found", format!("Cooperative not found: {}", id), None)
            }
            HaulageError::FarmerNotFound(id) => (StatusCode::NOT_FOUND, "farmer_not_found", format!("Farmer not found: {}", id), None),
            HaulageError::LocationNotFound { field, address } => {
                let details = Some(serde_json::json!({ "field": field, "address": address }));
                (StatusCode::NOT_FOUND, "location_not_found", format!("Location not found: {}", address), details)
            }

            HaulageError::InvalidTransition { from, action } => {
                let details = Some(serde_json::json!({ "from": from, "action": action }));
                (StatusCode::CONFLICT, "invalid_transition", format!("Cannot {} a trip that is {}", action, from), details)
            }
            HaulageError::PriceLocked(id) => (StatusCode::CONFLICT, "price_locked", format!("Price is locked for trip {}", id), None),
            HaulageError::TripAlreadyAssigned => (StatusCode::CONFLICT, "trip_already_assigned", "Trip is already assigned".to_string(), None),
            HaulageError::DriverNotAvailable => (StatusCode::CONFLICT, "driver_not_available", "Driver is not available".to_string(), None),
            HaulageError::DriverNotVerified => (StatusCode::FORBIDDEN, "driver_not_verified", "Driver is not verified".to_string(), None),
            HaulageError::DriverCapacityExceeded { capacity_kg, weight_kg } => {
                let details = Some(serde_json::json!({ "capacity_kg": capacity_kg, "weight_kg": weight_kg }));
                (StatusCode::CONFLICT, "capacity_exceeded", "Trip weight exceeds driver capacity".to_string(), details)
            }
            HaulageError::WeightVarianceUnconfirmed { variance, threshold } => {
                let details = Some(serde_json::json!({ "variance": variance, "threshold": threshold }));
                (
                    StatusCode::PRECONDITION_REQUIRED,
                    "weight_variance_unconfirmed",
                    format!("Weight variance of {:.1}% must be confirmed", variance * 100.0),
                    details,
                )
            }
            HaulageError::DistancePending { field } => {
                let details = Some(serde_json::json!({ "field": field }));
                (StatusCode::SERVICE_UNAVAILABLE, "distance_pending", "Distance is still being calculated".to_string(), details)
            }

            // All other errors are treated as internal server errors
            other => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", other.to_string(), None),
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type HaulageResult<T> = Result<T, HaulageError>;

impl From<redis::RedisError> for HaulageError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => HaulageError::RedisConnection(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => HaulageError::RedisConnection("Authentication failed".to_string()),
            _ => HaulageError::RedisQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for HaulageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HaulageError::NetworkTimeout
        } else if err.is_connect() {
            HaulageError::NetworkConnection(err.to_string())
        } else {
            HaulageError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HaulageError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            HaulageError::JsonParsing(err.to_string())
        } else {
            HaulageError::JsonSerialization(err.to_string())
        }
    }
}

// Helper functions for creating common errors
impl HaulageError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        HaulageError::Forbidden(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        HaulageError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        HaulageError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn invalid_field(field: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        HaulageError::InvalidFieldValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn trip_not_found(trip_id: impl Into<String>) -> Self {
        HaulageError::TripNotFound(trip_id.into())
    }

    pub fn driver_not_found(driver_id: impl Into<String>) -> Self {
        HaulageError::DriverNotFound(driver_id.into())
    }

    pub fn cooperative_not_found(cooperative_id: impl Into<String>) -> Self {
        HaulageError::CooperativeNotFound(cooperative_id.into())
    }

    pub fn farmer_not_found(farmer_id: impl Into<String>) -> Self {
        HaulageError::FarmerNotFound(farmer_id.into())
    }
}
