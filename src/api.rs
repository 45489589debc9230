//! Order service API client.
//!
//! Authenticated HTTP communication with the remote order service: batch
//! order submission and a lightweight reachability probe. The engine only
//! depends on the [`RemoteSync`] seam; everything wire-shaped lives here.

use std::future::Future;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::order::{SyncRequest, SyncResponse};
use crate::storage;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used for the lightweight reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote order service seam. One logical operation: submit a batch of
/// orders, get back success/failure. The probe lets the background loop
/// skip cycles while the device is offline.
pub trait RemoteSync: Send + Sync {
    fn submit(
        &self,
        request: SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, SyncError>> + Send;

    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the order service URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_service_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // Strip trailing slashes again (in case "/api/" was present)
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Connection strings
// ---------------------------------------------------------------------------

/// Onboarding hands the terminal one pasted "connection string": either a
/// raw JSON object or a url-safe base64 blob of `{ "url", "key", "tid" }`.
fn decode_connection_string_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 20 {
        return None;
    }

    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

fn field_from_connection_string(raw: &str, keys: &[&str]) -> Option<String> {
    let payload = decode_connection_string_payload(raw)?;
    for key in keys {
        if let Some(s) = payload.get(*key).and_then(Value::as_str) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub fn extract_api_key_from_connection_string(raw: &str) -> Option<String> {
    field_from_connection_string(raw, &["key"])
}

pub fn extract_service_url_from_connection_string(raw: &str) -> Option<String> {
    field_from_connection_string(raw, &["url"]).map(|u| normalize_service_url(&u))
}

pub fn extract_terminal_id_from_connection_string(raw: &str) -> Option<String> {
    field_from_connection_string(raw, &["tid", "terminalId"])
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach order service at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid order service URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Terminal not authorized".to_string(),
        404 => "Order service endpoint not found".to_string(),
        s if s >= 500 => format!("Order service server error (HTTP {s})"),
        s => format!("Unexpected response from order service (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Production client
// ---------------------------------------------------------------------------

/// Reqwest-backed [`RemoteSync`] adapter talking to the order service.
pub struct OrderServiceClient {
    base_url: String,
    api_key: String,
    terminal_id: String,
    http: Client,
}

impl OrderServiceClient {
    pub fn new(
        service_url: &str,
        api_key: &str,
        terminal_id: &str,
    ) -> Result<Self, SyncError> {
        let resolved_api_key = extract_api_key_from_connection_string(api_key)
            .unwrap_or_else(|| api_key.trim().to_string());
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(OrderServiceClient {
            base_url: normalize_service_url(service_url),
            api_key: resolved_api_key,
            terminal_id: terminal_id.trim().to_string(),
            http,
        })
    }

    /// Build a client from the credentials in the OS credential store.
    pub fn from_credentials() -> Result<Self, SyncError> {
        let creds = storage::load_credentials().ok_or(SyncError::NotConfigured)?;
        Self::new(&creds.service_url, &creds.api_key, &creds.terminal_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteSync for OrderServiceClient {
    async fn submit(&self, request: SyncRequest) -> Result<SyncResponse, SyncError> {
        let url = format!("{}/api/pos/orders/sync", self.base_url);
        let body = serde_json::json!({
            "terminal_id": self.terminal_id,
            "orders": request.orders,
        });

        debug!(count = request.orders.len(), "POST {url}");

        let resp = self
            .http
            .post(&url)
            .header("X-POS-API-Key", &self.api_key)
            .header("x-terminal-id", &self.terminal_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Network(friendly_error(&self.base_url, &e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Network(status_error(status)));
        }

        let payload: Value = resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
        Ok(SyncResponse::from_body(payload))
    }

    async fn is_reachable(&self) -> bool {
        let health_url = format!("{}/api/health", self.base_url);
        let client = match Client::builder().timeout(PROBE_TIMEOUT).build() {
            Ok(c) => c,
            Err(_) => return false,
        };

        match client
            .head(&health_url)
            .header("X-POS-API-Key", &self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Test connectivity to the order service with a lightweight health-check,
/// reporting latency for the diagnostics screen.
pub async fn test_connectivity(service_url: &str, api_key: &str) -> ConnectivityResult {
    let url = normalize_service_url(service_url);
    let resolved_api_key =
        extract_api_key_from_connection_string(api_key).unwrap_or_else(|| api_key.to_string());
    let health_url = format!("{url}/api/health");

    let client = match Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(format!("Failed to create HTTP client: {e}")),
            };
        }
    };

    let start = Instant::now();

    let resp = match client
        .get(&health_url)
        .header("X-POS-API-Key", resolved_api_key)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(friendly_error(&url, &e)),
            };
        }
    };

    let latency = start.elapsed().as_millis() as u64;
    let status = resp.status();

    if status.is_success() {
        info!(latency_ms = latency, "connectivity test passed");
        ConnectivityResult {
            success: true,
            latency_ms: Some(latency),
            error: None,
        }
    } else {
        ConnectivityResult {
            success: false,
            latency_ms: Some(latency),
            error: Some(status_error(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_service_url() {
        assert_eq!(
            normalize_service_url("orders.brewline.app"),
            "https://orders.brewline.app"
        );
        assert_eq!(
            normalize_service_url("https://orders.brewline.app/api/"),
            "https://orders.brewline.app"
        );
        assert_eq!(
            normalize_service_url("localhost:3000/"),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_service_url("  https://orders.brewline.app// "),
            "https://orders.brewline.app"
        );
    }

    #[test]
    fn test_connection_string_decoding() {
        let payload = serde_json::json!({
            "url": "orders.brewline.app/api",
            "key": "sk-terminal-42",
            "tid": "t-042"
        });
        let encoded = BASE64_STANDARD.encode(payload.to_string());

        assert_eq!(
            extract_api_key_from_connection_string(&encoded).as_deref(),
            Some("sk-terminal-42")
        );
        assert_eq!(
            extract_service_url_from_connection_string(&encoded).as_deref(),
            Some("https://orders.brewline.app")
        );
        assert_eq!(
            extract_terminal_id_from_connection_string(&encoded).as_deref(),
            Some("t-042")
        );

        // Raw JSON works too
        let raw = payload.to_string();
        assert_eq!(
            extract_terminal_id_from_connection_string(&raw).as_deref(),
            Some("t-042")
        );

        // Garbage decodes to nothing
        assert!(extract_api_key_from_connection_string("short").is_none());
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            "API key is invalid or expired"
        );
        assert_eq!(status_error(StatusCode::FORBIDDEN), "Terminal not authorized");
        assert!(status_error(StatusCode::BAD_GATEWAY).contains("HTTP 502"));
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS).contains("HTTP 429"));
    }

    #[test]
    fn test_client_resolves_connection_string_api_key() {
        let payload = serde_json::json!({
            "url": "orders.brewline.app",
            "key": "sk-decoded",
            "tid": "t-9"
        });
        let encoded = BASE64_STANDARD.encode(payload.to_string());

        let client = OrderServiceClient::new("orders.brewline.app", &encoded, "t-9").unwrap();
        assert_eq!(client.api_key, "sk-decoded");
        assert_eq!(client.base_url(), "https://orders.brewline.app");
    }
}
