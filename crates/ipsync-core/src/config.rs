//! Configuration types for ipsync
//!
//! A [`SyncConfig`] is built once at startup and passed by reference into the
//! backend factories and the engine. Nothing reads configuration from global
//! state after that.

use serde::{Deserialize, Serialize};

/// Main ipsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Registry (system of record) configuration
    pub registry: RegistryConfig,

    /// Poller (discovery system) configuration
    pub poller: PollerConfig,

    /// HTTP transport settings shared by every backend
    #[serde(default)]
    pub transport: TransportConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with default transport and engine settings
    pub fn new(registry: RegistryConfig, poller: PollerConfig) -> Self {
        Self {
            registry,
            poller,
            transport: TransportConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.registry.validate()?;
        self.poller.validate()?;
        self.transport.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Registry configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryConfig {
    /// NetBox IPAM
    Netbox {
        /// Base URL (e.g., "https://netbox.example.com/")
        url: String,
        /// API token used for reads (and writes unless `write_token` is set)
        token: String,
        /// Separate API token for writes
        #[serde(default)]
        write_token: Option<String>,
        /// Log write payloads instead of sending them
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom registry
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl RegistryConfig {
    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RegistryConfig::Netbox {
                url,
                token,
                write_token,
                ..
            } => {
                validate_url("NetBox", url)?;
                if token.is_empty() {
                    return Err(crate::Error::config("NetBox API token cannot be empty"));
                }
                if write_token.as_ref().is_some_and(|t| t.is_empty()) {
                    return Err(crate::Error::config(
                        "NetBox write token cannot be empty when set",
                    ));
                }
                Ok(())
            }
            RegistryConfig::Custom { factory, config } => validate_custom("registry", factory, config),
        }
    }

    /// Get the registry type name
    pub fn type_name(&self) -> &str {
        match self {
            RegistryConfig::Netbox { .. } => "netbox",
            RegistryConfig::Custom { factory, .. } => factory,
        }
    }
}

// Tokens stay out of Debug output
impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryConfig::Netbox {
                url,
                write_token,
                dry_run,
                ..
            } => f
                .debug_struct("Netbox")
                .field("url", url)
                .field("token", &"<REDACTED>")
                .field("write_token", &write_token.as_ref().map(|_| "<REDACTED>"))
                .field("dry_run", dry_run)
                .finish(),
            RegistryConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// Poller configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollerConfig {
    /// LibreNMS
    Librenms {
        /// Base URL (e.g., "https://librenms.example.com/")
        url: String,
        /// API token sent as `X-Auth-Token`
        token: String,
    },

    /// Custom poller
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl PollerConfig {
    /// Validate the poller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PollerConfig::Librenms { url, token } => {
                validate_url("LibreNMS", url)?;
                if token.is_empty() {
                    return Err(crate::Error::config("LibreNMS API token cannot be empty"));
                }
                Ok(())
            }
            PollerConfig::Custom { factory, config } => validate_custom("poller", factory, config),
        }
    }

    /// Get the poller type name
    pub fn type_name(&self) -> &str {
        match self {
            PollerConfig::Librenms { .. } => "librenms",
            PollerConfig::Custom { factory, .. } => factory,
        }
    }
}

impl std::fmt::Debug for PollerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollerConfig::Librenms { url, .. } => f
                .debug_struct("Librenms")
                .field("url", url)
                .field("token", &"<REDACTED>")
                .finish(),
            PollerConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

fn validate_url(backend: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} URL cannot be empty", backend)));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{} URL must use HTTP or HTTPS scheme. Got: {}",
            backend, url
        )));
    }
    Ok(())
}

fn validate_custom(kind: &str, factory: &str, config: &serde_json::Value) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            kind
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {} config cannot be null",
            kind
        )));
    }
    Ok(())
}

/// HTTP transport settings applied uniformly to every backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Verify TLS certificates
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TransportConfig {
    /// Validate the transport configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("HTTP timeout must be > 0"));
        }
        Ok(())
    }

    /// Per-request timeout as a Duration
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            verify_tls: default_verify_tls(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Submit the update request even when there is nothing to patch
    ///
    /// Creates are always skipped when empty. Patches are submitted
    /// regardless by default; set to false to skip them the same way.
    #[serde(default = "default_patch_when_empty")]
    pub patch_when_empty: bool,

    /// Capacity of the event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            patch_when_empty: default_patch_when_empty(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_patch_when_empty() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}
