// # LibreNMS Poller Backend
//
// Reads the device inventory of a LibreNMS instance through its v0 API.
//
// - Single GET per run, no retries (the engine owns failure policy)
// - Only the columns the reconciler uses are kept
// - `device_id` is decoded exactly; a value that is not an integer fails the fetch
//
// ## API Reference
//
// - List devices: GET `/api/v0/devices?all` with `X-Auth-Token`
// - Response: `{"status": "ok", "count": N, "devices": [...]}`

use async_trait::async_trait;
use ipsync_core::config::{PollerConfig, TransportConfig};
use ipsync_core::records::{DeviceId, PollerDevice};
use ipsync_core::traits::{PollerBackend, PollerBackendFactory};
use ipsync_core::{BackendRegistry, Error, Result};
use reqwest::StatusCode;
use serde_json::Value;

const BACKEND_NAME: &str = "librenms";

/// LibreNMS device poller
pub struct LibrenmsPoller {
    /// Base URL without trailing slash
    base_url: String,

    /// API token
    /// ⚠️ NEVER log this value
    token: String,

    client: reqwest::Client,
}

impl std::fmt::Debug for LibrenmsPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibrenmsPoller")
            .field("base_url", &self.base_url)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl LibrenmsPoller {
    /// Create a new LibreNMS poller
    ///
    /// # Parameters
    ///
    /// - `url`: LibreNMS base URL (e.g., "https://librenms.example.com/")
    /// - `token`: API token, sent as `X-Auth-Token`
    /// - `transport`: TLS verification and timeout
    pub fn new(url: impl Into<String>, token: impl Into<String>, transport: &TransportConfig) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::config("LibreNMS API token cannot be empty"));
        }

        if !transport.verify_tls {
            tracing::warn!("TLS certificate verification is disabled for LibreNMS");
        }

        let client = reqwest::Client::builder()
            .timeout(transport.timeout())
            .danger_accept_invalid_certs(!transport.verify_tls)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn devices_url(&self) -> String {
        format!("{}/api/v0/devices?all", self.base_url)
    }
}

/// Normalize a LibreNMS device listing
///
/// Keeps `ip`, `device_id`, `sysName`, `sysDescr`, `hardware`, `os`,
/// `last_polled` and `serial`; missing metadata columns become null.
pub fn normalize_devices(body: &Value) -> Result<Vec<PollerDevice>> {
    let devices = body
        .get("devices")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::decode("LibreNMS response has no devices array"))?;

    devices.iter().map(normalize_device).collect()
}

fn normalize_device(item: &Value) -> Result<PollerDevice> {
    let field = |name: &str| item.get(name).cloned().unwrap_or(Value::Null);

    let ip = match item.get("ip") {
        None | Some(Value::Null) => None,
        Some(Value::String(ip)) => Some(ip.clone()),
        Some(other) => {
            return Err(Error::decode(format!("LibreNMS device has non-string ip: {}", other)));
        }
    };

    Ok(PollerDevice {
        ip,
        device_id: DeviceId::from_json(&field("device_id"))?,
        sys_name: field("sysName"),
        sys_descr: field("sysDescr"),
        hardware: field("hardware"),
        os: field("os"),
        last_polled: field("last_polled"),
        serial: field("serial"),
    })
}

#[async_trait]
impl PollerBackend for LibrenmsPoller {
    async fn fetch_devices(&self) -> Result<Vec<PollerDevice>> {
        let url = self.devices_url();
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("LibreNMS request failed in fetch_devices: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::unexpected_status(BACKEND_NAME, "fetch_devices", status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::decode(format!("Failed to parse LibreNMS response: {}", e)))?;

        let devices = normalize_devices(&body)?;
        tracing::debug!("LibreNMS returned {} device(s)", devices.len());
        Ok(devices)
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

/// Factory for creating LibreNMS pollers
pub struct LibrenmsFactory;

impl PollerBackendFactory for LibrenmsFactory {
    fn create(&self, config: &PollerConfig, transport: &TransportConfig) -> Result<Box<dyn PollerBackend>> {
        match config {
            PollerConfig::Librenms { url, token } => Ok(Box::new(LibrenmsPoller::new(
                url.clone(),
                token.clone(),
                transport,
            )?)),
            _ => Err(Error::config("Invalid config for LibreNMS poller")),
        }
    }
}

/// Register the LibreNMS poller with a backend registry
pub fn register(registry: &BackendRegistry) {
    registry.register_poller(BACKEND_NAME, Box::new(LibrenmsFactory));
}
