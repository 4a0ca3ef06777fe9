//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod routes;
mod sessions;

pub use health::{health, service_info, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use sessions::list_sessions;
