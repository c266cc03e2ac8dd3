// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod storage;
pub mod telemetry;

// Domain layer
pub mod delivery;
pub mod notification;
pub mod provider;
pub mod registration;

// Application layer
pub mod api;
pub mod server;
