//! HTTP client for the remote location collector.
//!
//! The wire protocol is deliberately small: one endpoint accepts a single
//! location, another accepts a batch. Success is any 2xx acknowledgement;
//! no response body is required. Every transport error, timeout, or
//! negative acknowledgement surfaces as a delivery error — the coordinator
//! treats them all the same.
//!
//! # Example
//!
//! ```no_run
//! use waypost_sync::{SyncClient, Transport};
//!
//! # async fn example() -> waypost_sync::Result<()> {
//! let client = SyncClient::new("http://collector.example.com")?;
//! client.send_batch("device-1", &[]).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use waypost_store::LocationRecord;

use crate::error::{Error, Result};

/// Request timeout for collector calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One location in an outbound request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl From<&LocationRecord> for LocationPayload {
    fn from(record: &LocationRecord) -> Self {
        Self {
            latitude: record.latitude,
            longitude: record.longitude,
            accuracy: record.accuracy,
            altitude: record.altitude,
            speed: record.speed,
            bearing: record.bearing,
            timestamp: record.timestamp,
            provider: record.provider.clone(),
        }
    }
}

/// Batch request body: `{"deviceId": ..., "locations": [...]}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub device_id: String,
    pub locations: Vec<LocationPayload>,
}

/// Single-location request body: the payload fields plus the device id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRequest {
    pub device_id: String,
    #[serde(flatten)]
    pub location: LocationPayload,
}

/// Delivery seam between the coordinator and the wire.
///
/// Implemented by [`SyncClient`] for HTTP and by test doubles in unit
/// tests, following the same pattern as any other hardware seam.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a batch. `Ok` only on a positive acknowledgement; the batch
    /// is all-or-nothing, there is no per-item granularity.
    async fn send_batch(&self, device_id: &str, records: &[LocationRecord]) -> Result<()>;

    /// Deliver a single record outside the batch cycle (best-effort
    /// immediate path).
    async fn send_single(&self, device_id: &str, record: &LocationRecord) -> Result<()>;
}

/// HTTP client for the remote collector.
#[derive(Debug, Clone)]
pub struct SyncClient {
    client: Client,
    base_url: String,
}

impl SyncClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the collector (e.g., "https://collector.example.com")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Request)?;

        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        // Normalize URL (remove trailing slash)
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::NotReachable {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Transport for SyncClient {
    async fn send_batch(&self, device_id: &str, records: &[LocationRecord]) -> Result<()> {
        let request = BatchRequest {
            device_id: device_id.to_string(),
            locations: records.iter().map(LocationPayload::from).collect(),
        };

        let url = format!("{}/locations/batch", self.base_url);
        debug!("Sending batch of {} locations to {}", records.len(), url);
        self.post_json(&url, &request).await
    }

    async fn send_single(&self, device_id: &str, record: &LocationRecord) -> Result<()> {
        let request = SingleRequest {
            device_id: device_id.to_string(),
            location: LocationPayload::from(record),
        };

        let url = format!("{}/location", self.base_url);
        debug!("Sending single location to {}", url);
        self.post_json(&url, &request).await
    }
}
