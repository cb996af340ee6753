use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{
    BackendClient, BackendError, DeviceEvent, DeviceRecord, IngestOutcome, Reading, SyncOutcome,
};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::RateLimiter;
use crate::config::ApiConfig;

pub const DEVICE_SYNC_PATH: &str = "/api/v1/ha/devices/sync";
pub const TELEMETRY_INGEST_PATH: &str = "/api/v1/ha/telemetry/ingest";
pub const EVENTS_INGEST_PATH: &str = "/api/v1/ha/events/ingest";

/// Longest response excerpt carried into an error message
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize)]
pub(crate) struct SyncRequest<'a> {
    pub site_id: &'a str,
    pub devices: &'a [DeviceRecord],
}

#[derive(Debug, Serialize)]
pub(crate) struct TelemetryRequest<'a> {
    pub site_id: &'a str,
    pub timestamp: String,
    pub readings: &'a [Reading],
}

#[derive(Debug, Serialize)]
pub(crate) struct EventsRequest<'a> {
    pub site_id: &'a str,
    pub events: &'a [DeviceEvent],
}

/// Backend client over HTTPS with bearer auth and a per-minute request budget
pub struct HttpBackendClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl HttpBackendClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn sync_devices(
        &self,
        site_id: &str,
        devices: &[DeviceRecord],
    ) -> Result<SyncOutcome, BackendError> {
        self.post(DEVICE_SYNC_PATH, &SyncRequest { site_id, devices })
            .await
    }

    async fn push_telemetry(
        &self,
        site_id: &str,
        timestamp: DateTime<Utc>,
        readings: &[Reading],
    ) -> Result<IngestOutcome, BackendError> {
        let request = TelemetryRequest {
            site_id,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            readings,
        };
        self.post(TELEMETRY_INGEST_PATH, &request).await
    }

    async fn report_events(
        &self,
        site_id: &str,
        events: &[DeviceEvent],
    ) -> Result<IngestOutcome, BackendError> {
        self.post(EVENTS_INGEST_PATH, &EventsRequest { site_id, events })
            .await
    }
}

/// Split a non-success status into the error kinds callers react to
pub fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = error_message(status, body);
    match status.as_u16() {
        401 | 403 => BackendError::Auth(message),
        code if status.is_server_error() => BackendError::Server {
            status: code,
            message,
        },
        code => BackendError::Api {
            status: code,
            message,
        },
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_decode() {
        BackendError::Decode(e.to_string())
    } else if e.is_timeout() {
        BackendError::Connection(format!("request timed out: {e}"))
    } else {
        BackendError::Connection(e.to_string())
    }
}

/// `detail` from a JSON error body, else a trimmed excerpt of the body
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string));
    if let Some(detail) = detail {
        return detail;
    }

    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}
