// # Poller Backend Trait
//
// Defines the interface for reading discovered devices from a polling system.
//
// ## Implementations
//
// - LibreNMS: `ipsync-poller-librenms` crate

use async_trait::async_trait;

use crate::config::{PollerConfig, TransportConfig};
use crate::records::PollerDevice;

/// Trait for poller implementations
///
/// A poller is read-only from the point of view of this system: it is
/// fetched once per run and never written to.
///
/// Implementations must:
/// - issue exactly one request per call, with no retry
/// - return every device the poller reports, in the order it reports them
/// - fail the whole call when the response cannot be decoded, including a
///   `device_id` that is not an exact integer
#[async_trait]
pub trait PollerBackend: Send + Sync {
    /// Fetch every device known to the poller
    async fn fetch_devices(&self) -> Result<Vec<PollerDevice>, crate::Error>;

    /// Backend name (for logging/diagnostics)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing pollers from configuration
pub trait PollerBackendFactory: Send + Sync {
    /// Create a PollerBackend instance from configuration
    fn create(
        &self,
        config: &PollerConfig,
        transport: &TransportConfig,
    ) -> Result<Box<dyn PollerBackend>, crate::Error>;
}
