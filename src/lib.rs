// Shared components
pub mod config;
pub mod error;
pub mod metrics;

// Domain layer
pub mod connection_manager;
pub mod relay;

// Application layer
pub mod api;
pub mod server;
pub mod triggers;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod telemetry;
