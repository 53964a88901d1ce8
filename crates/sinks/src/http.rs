//! HTTP transport for the bulk pipe
//!
//! POSTs NDJSON bodies to `{url}/_bulk` and counts per-item rejections from
//! the response. Also hosts the readiness probe used before the first
//! remote writer is built.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fanlog_config::RemoteConfig;
use serde_json::Value;

use crate::delivery::{BulkOutcome, BulkTransport, DeliveryError};

/// Request timeout for one bulk POST
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed [`BulkTransport`]
#[derive(Debug, Clone)]
pub struct HttpBulkTransport {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpBulkTransport {
    /// # Errors
    ///
    /// Returns [`DeliveryError::Setup`] if the HTTP client cannot be built.
    pub fn new(url: &str, insecure: bool) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| DeliveryError::Setup(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: bulk_endpoint(url),
            username: None,
            password: None,
        })
    }

    /// Transport for an enabled `[remote]` section
    pub fn from_config(config: &RemoteConfig) -> Result<Self, DeliveryError> {
        let mut transport = Self::new(&config.url, config.insecure)?;
        if let Some(username) = &config.username {
            transport = transport.with_basic_auth(username.clone(), config.password.clone());
        }
        Ok(transport)
    }

    #[must_use]
    pub fn with_basic_auth(mut self, username: String, password: Option<String>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BulkTransport for HttpBulkTransport {
    async fn send(&self, body: Bytes, items: usize) -> Result<BulkOutcome, DeliveryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(parse_bulk_response(&text, items))
    }
}

fn bulk_endpoint(url: &str) -> String {
    format!("{}/_bulk", url.trim_end_matches('/'))
}

/// Count failed items in a bulk response body.
///
/// Bodies that are not JSON, or that report `"errors": false`, count every
/// item as succeeded.
pub(crate) fn parse_bulk_response(text: &str, items: usize) -> BulkOutcome {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return BulkOutcome::all_succeeded(items);
    };

    if !json.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return BulkOutcome::all_succeeded(items);
    }

    let failed = json
        .get("items")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| {
                    entry
                        .as_object()
                        .and_then(|op| op.values().next())
                        .and_then(|result| result.get("status"))
                        .and_then(Value::as_u64)
                        .is_some_and(|status| status >= 300)
                })
                .count()
        })
        .unwrap_or(0)
        .min(items);

    BulkOutcome {
        succeeded: items - failed,
        failed,
    }
}

/// Whether the backend answers its root endpoint with a success status
/// within `timeout`
pub async fn is_ready(url: &str, timeout: Duration, insecure: bool) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "failed to build readiness client");
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!(url, error = %e, "readiness probe failed");
            false
        }
    }
}
