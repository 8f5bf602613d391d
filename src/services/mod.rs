// src/services/mod.rs
pub mod cooperative_service;
pub mod driver_service;
pub mod geocoding_service;
pub mod lifecycle;
pub mod messaging_service;
pub mod pricing;
pub mod store_service;
pub mod trip_service;
