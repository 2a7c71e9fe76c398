//! # Transit Arrival Fetching
//!
//! This module defines the data source boundary ([`ArrivalSource`]) and the HTTP
//! implementation used in production.
//!
//! ## Data Source
//!
//! ### Arrivals Feed
//! - **Transport**: HTTPS GET via `reqwest` (rustls, no OpenSSL on the Pi)
//! - **Auth**: optional bearer token (`transit.api_key` / `FRIDA_API_KEY`)
//! - **Stop**: optional `stop` query parameter (`transit.stop_id`)
//! - **Format**: JSON object with an `arrivals` array:
//!
//! ```json
//! {"arrivals": [
//!   {"route": "42", "headsign": "Downtown", "minutes": 5},
//!   {"route": "Train A", "destination": "Airport", "minutes": null}
//! ]}
//! ```
//!
//! ### Processing
//! 1. **Fetch**: one GET with the configured timeout
//! 2. **Parse**: decode the body; records with negative minutes have already departed
//!    and are dropped, `null` or missing minutes mean "unknown"
//! 3. **Trim**: keep the first `max_arrivals` records, in feed order
//!
//! ## Error Handling
//!
//! Every failure is a [`FetchError`]. The fetch loop treats all of them as
//! transient: it logs, keeps the previous snapshot and tries again next tick.

use crate::config::TransitConfig;
use crate::{ArrivalRecord, ArrivalSnapshot};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while fetching arrivals.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (network, TLS, connect or read timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The whole fetch exceeded its time budget
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// No usable source was configured at startup
    #[error("transit source unavailable")]
    Unavailable,
}

/// Anything that can produce an [`ArrivalSnapshot`].
///
/// Implementations are stateless between calls and must be cancel-safe: the fetch
/// loop drops an in-flight `fetch` future when shutdown is requested.
#[async_trait]
pub trait ArrivalSource: Send + Sync {
    async fn fetch(&self) -> Result<ArrivalSnapshot, FetchError>;
}

/// Arrivals feed over HTTPS.
pub struct HttpArrivalSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    stop_id: Option<String>,
    max_arrivals: usize,
}

impl HttpArrivalSource {
    /// Build a client for the configured feed. Fails when no URL is configured.
    pub fn new(config: &TransitConfig) -> Result<Self, FetchError> {
        if config.url.trim().is_empty() {
            return Err(FetchError::Unavailable);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("frida-freq/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim().to_string(),
            api_key: config.api_key.clone(),
            stop_id: config.stop_id.clone(),
            max_arrivals: config.max_arrivals,
        })
    }
}

#[async_trait]
impl ArrivalSource for HttpArrivalSource {
    async fn fetch(&self) -> Result<ArrivalSnapshot, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(stop) = &self.stop_id {
            request = request.query(&[("stop", stop)]);
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "arrivals response received");
        parse_arrivals(&body, self.max_arrivals)
    }
}

/// Stand-in used when no source could be built. Every fetch fails with
/// [`FetchError::Unavailable`], so the board keeps showing its placeholder.
pub struct UnavailableSource;

#[async_trait]
impl ArrivalSource for UnavailableSource {
    async fn fetch(&self) -> Result<ArrivalSnapshot, FetchError> {
        Err(FetchError::Unavailable)
    }
}

// -- Private Implementation --

#[derive(Deserialize)]
struct ArrivalsResponse {
    arrivals: Vec<WireArrival>,
}

#[derive(Deserialize)]
struct WireArrival {
    route: String,
    #[serde(alias = "destination")]
    headsign: String,
    #[serde(default)]
    minutes: Option<i64>,
}

/// Decode an arrivals response body into a snapshot.
///
/// Records keep the order of the feed. At most `max_arrivals` survive.
pub fn parse_arrivals(body: &[u8], max_arrivals: usize) -> Result<ArrivalSnapshot, FetchError> {
    let response: ArrivalsResponse = serde_json::from_slice(body)?;

    let records = response
        .arrivals
        .into_iter()
        .filter_map(|wire| {
            let minutes = match wire.minutes {
                Some(m) if m < 0 => return None,
                Some(m) => Some(u32::try_from(m).unwrap_or(u32::MAX)),
                None => None,
            };
            Some(ArrivalRecord::new(wire.route, wire.headsign, minutes))
        })
        .take(max_arrivals)
        .collect();

    Ok(ArrivalSnapshot::new(records))
}
