//! HTTP adapter for the remote backend.

mod http_client;
mod rate_limiter;

pub use http_client::{
    DEVICE_SYNC_PATH, EVENTS_INGEST_PATH, HttpBackendClient, TELEMETRY_INGEST_PATH, status_error,
};
pub use rate_limiter::RateLimiter;
