// src/services/pricing.rs
use crate::errors::HaulageError as AppError;
use crate::models::trip::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points.
pub fn distance_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1_rad = from.latitude.to_radians();
    let lat2_rad = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// `weight × price_per_kg + distance × price_per_km`, rounded to cents.
pub fn total_price(weight_kg: f64, price_per_kg: f64, distance_km: f64, price_per_km: f64) -> f64 {
    round_cents(weight_kg * price_per_kg + distance_km * price_per_km)
}

/// `|actual - expected| / expected`; `None` when there is no usable baseline.
pub fn weight_variance(expected_kg: f64, actual_kg: f64) -> Option<f64> {
    if !expected_kg.is_finite() || !actual_kg.is_finite() || expected_kg <= 0.0 {
        return None;
    }
    Some((actual_kg - expected_kg).abs() / expected_kg)
}

/// Exclusive: a variance exactly at the threshold passes without confirmation.
pub fn exceeds_threshold(variance: f64, threshold: f64) -> bool {
    variance > threshold
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn validate_rate(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::invalid_field(field, value, "must be a positive number"));
    }
    Ok(())
}
