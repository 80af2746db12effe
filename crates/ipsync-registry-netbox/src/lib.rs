// # NetBox Registry Backend
//
// This crate provides the NetBox IPAM implementation of `RegistryBackend`.
//
// ## Behavior
//
// - One HTTP request per call; no retry, no backoff, no caching
// - Reads ask for every record at once (`?limit=0`)
// - Bulk create (POST) and bulk update (PATCH) carry the whole batch
// - Success is the exact status NetBox documents: 200 for reads and
//   updates, 201 for creates
// - Dry-run mode performs reads, logs write payloads and sends nothing
//
// ## Security
//
// - Tokens never appear in logs, errors or Debug output
// - TLS verification follows `TransportConfig::verify_tls`
//
// ## API Reference
//
// - List: GET `/api/ipam/ip-addresses/?limit=0`
// - Bulk create: POST `/api/ipam/ip-addresses/` with a JSON array
// - Bulk update: PATCH `/api/ipam/ip-addresses/` with a JSON array of objects carrying `id`

use async_trait::async_trait;
use ipsync_core::config::{RegistryConfig, TransportConfig};
use ipsync_core::records::{CreateEntry, PatchEntry, RegistryId, RegistryIpRecord, WriteReceipt};
use ipsync_core::traits::{RegistryBackend, RegistryBackendFactory};
use ipsync_core::{BackendRegistry, Error, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;

const BACKEND_NAME: &str = "netbox";

/// Path of the IP address collection, relative to the base URL
const IP_ADDRESSES_PATH: &str = "api/ipam/ip-addresses/";

/// NetBox IPAM registry
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the registry will:
/// - Perform GET requests normally
/// - Log the intended POST/PATCH payloads
/// - **NOT** modify any record
pub struct NetboxRegistry {
    /// Base URL without trailing slash
    base_url: String,

    /// Token for reads
    /// ⚠️ NEVER log this value
    read_token: String,

    /// Token for writes
    /// ⚠️ NEVER log this value
    write_token: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the tokens
impl std::fmt::Debug for NetboxRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetboxRegistry")
            .field("base_url", &self.base_url)
            .field("read_token", &"<REDACTED>")
            .field("write_token", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl NetboxRegistry {
    /// Create a new NetBox registry
    ///
    /// # Parameters
    ///
    /// - `url`: NetBox base URL (e.g., "https://netbox.example.com/")
    /// - `token`: API token for reads, and for writes when `write_token` is None
    /// - `write_token`: Optional separate token for writes
    /// - `dry_run`: If true, perform reads but skip writes
    /// - `transport`: TLS verification and timeout
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        write_token: Option<String>,
        dry_run: bool,
        transport: &TransportConfig,
    ) -> Result<Self> {
        let read_token = token.into();
        if read_token.is_empty() {
            return Err(Error::config("NetBox API token cannot be empty"));
        }
        let write_token = write_token.unwrap_or_else(|| read_token.clone());

        if !transport.verify_tls {
            tracing::warn!("TLS certificate verification is disabled for NetBox");
        }

        let client = reqwest::Client::builder()
            .timeout(transport.timeout())
            .danger_accept_invalid_certs(!transport.verify_tls)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            read_token,
            write_token,
            client,
            dry_run,
        })
    }

    /// URL of the IP address collection
    fn addresses_url(&self) -> String {
        format!("{}/{}", self.base_url, IP_ADDRESSES_PATH)
    }

    /// Read the body of an unexpected response and turn it into an error
    async fn unexpected(operation: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Error::unexpected_status(BACKEND_NAME, operation, status.as_u16(), body)
    }

    /// Log a write payload instead of sending it
    fn dry_run_write<T: serde::Serialize>(&self, method: &str, entries: &[T]) -> Result<WriteReceipt> {
        let payload = serde_json::to_string(entries)?;
        tracing::info!(
            "[DRY-RUN] Would send {} request to {} with payload: {}",
            method,
            self.addresses_url(),
            payload
        );
        Ok(WriteReceipt {
            submitted: entries.len(),
            dry_run: true,
        })
    }
}

/// Normalize a NetBox list response into registry records
///
/// Takes the `results` array, splits each `address` into ip and mask and
/// flattens `custom_fields` into the record's extensions. A missing or null
/// `custom_fields` yields no extensions.
pub fn normalize_results(body: &Value) -> Result<Vec<RegistryIpRecord>> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::decode("NetBox response has no results array"))?;

    // MAX_PAGE_SIZE caps `limit=0`; a capped listing is not a snapshot
    if let Some(next) = body.get("next").filter(|next| !next.is_null()) {
        return Err(Error::decode(format!(
            "NetBox listing is truncated at {} record(s), next page: {}",
            results.len(),
            next
        )));
    }
    if let Some(count) = body.get("count").and_then(Value::as_u64)
        && count != results.len() as u64
    {
        return Err(Error::decode(format!(
            "NetBox listing holds {} of {} record(s)",
            results.len(),
            count
        )));
    }

    results
        .iter()
        .map(|item| {
            let id = item
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::decode(format!("NetBox record has no integer id: {}", item)))?;

            let address = item
                .get("address")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::decode(format!("NetBox record {} has no address", id)))?;

            let extensions: BTreeMap<String, Value> = match item.get("custom_fields") {
                None | Some(Value::Null) => BTreeMap::new(),
                Some(Value::Object(fields)) => fields.clone().into_iter().collect(),
                Some(other) => {
                    return Err(Error::decode(format!(
                        "NetBox record {} has non-object custom_fields: {}",
                        id, other
                    )));
                }
            };

            Ok(RegistryIpRecord::from_address(RegistryId(id), address).with_extensions(extensions))
        })
        .collect()
}

#[async_trait]
impl RegistryBackend for NetboxRegistry {
    /// # API Call
    ///
    /// ```http
    /// GET /api/ipam/ip-addresses/?limit=0
    /// Authorization: Token <token>
    /// Accept: application/json
    /// ```
    async fn fetch_addresses(&self) -> Result<Vec<RegistryIpRecord>> {
        let url = format!("{}?limit=0", self.addresses_url());
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.read_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("NetBox request failed in fetch_addresses: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(Self::unexpected("fetch_addresses", response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::decode(format!("Failed to parse NetBox response: {}", e)))?;

        normalize_results(&body)
    }

    /// # API Call
    ///
    /// ```http
    /// POST /api/ipam/ip-addresses/
    /// [{"address": "10.0.0.2/32", "status": "active"}, ...]
    /// ```
    async fn create_addresses(&self, entries: &[CreateEntry]) -> Result<WriteReceipt> {
        tracing::info!(
            "Creating {} IP record(s) in NetBox [mode: {}]",
            entries.len(),
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            return self.dry_run_write("POST", entries);
        }

        let response = self
            .client
            .post(self.addresses_url())
            .header("Authorization", format!("Token {}", self.write_token))
            .json(entries)
            .send()
            .await
            .map_err(|e| Error::http(format!("NetBox request failed in create_addresses: {}", e)))?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::unexpected("create_addresses", response).await);
        }

        Ok(WriteReceipt {
            submitted: entries.len(),
            dry_run: false,
        })
    }

    /// # API Call
    ///
    /// ```http
    /// PATCH /api/ipam/ip-addresses/
    /// [{"id": 1, "status": "active", "custom_fields": {...}}, ...]
    /// ```
    async fn update_addresses(&self, entries: &[PatchEntry]) -> Result<WriteReceipt> {
        tracing::info!(
            "Updating {} IP record(s) in NetBox with polling data [mode: {}]",
            entries.len(),
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            return self.dry_run_write("PATCH", entries);
        }

        let response = self
            .client
            .patch(self.addresses_url())
            .header("Authorization", format!("Token {}", self.write_token))
            .json(entries)
            .send()
            .await
            .map_err(|e| Error::http(format!("NetBox request failed in update_addresses: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(Self::unexpected("update_addresses", response).await);
        }

        Ok(WriteReceipt {
            submitted: entries.len(),
            dry_run: false,
        })
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

/// Factory for creating NetBox registries
pub struct NetboxFactory;

impl RegistryBackendFactory for NetboxFactory {
    fn create(
        &self,
        config: &RegistryConfig,
        transport: &TransportConfig,
    ) -> Result<Box<dyn RegistryBackend>> {
        match config {
            RegistryConfig::Netbox {
                url,
                token,
                write_token,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!("NetBox registry running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(NetboxRegistry::new(
                    url.clone(),
                    token.clone(),
                    write_token.clone(),
                    *dry_run,
                    transport,
                )?))
            }
            _ => Err(Error::config("Invalid config for NetBox registry")),
        }
    }
}

/// Register the NetBox registry with a backend registry
///
/// # Example
///
/// ```rust
/// use ipsync_core::BackendRegistry;
///
/// let backends = BackendRegistry::new();
/// ipsync_registry_netbox::register(&backends);
/// assert!(backends.has_registry("netbox"));
/// ```
pub fn register(registry: &BackendRegistry) {
    registry.register_registry(BACKEND_NAME, Box::new(NetboxFactory));
}
