// # Registry Backend Trait
//
// Defines the interface to the IP address system of record.
//
// ## Implementations
//
// - NetBox IPAM: `ipsync-registry-netbox` crate
//
// ## Usage
//
// ```rust,ignore
// use ipsync_core::RegistryBackend;
// use ipsync_core::records::CreateEntry;
//
// async fn ensure(registry: &dyn RegistryBackend) -> ipsync_core::Result<()> {
//     let known = registry.fetch_addresses().await?;
//     if !known.iter().any(|r| r.ip == "10.0.0.2") {
//         registry
//             .create_addresses(&[CreateEntry::host_route("10.0.0.2")])
//             .await?;
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::{RegistryConfig, TransportConfig};
use crate::records::{CreateEntry, PatchEntry, RegistryIpRecord, WriteReceipt};

/// Trait for Registry implementations
///
/// Every method is single-shot: one HTTP request, no retry, no backoff, no
/// caching between calls. Sequencing and failure policy belong to
/// [`crate::SyncEngine`].
///
/// Bulk writes are not transactional at this level. When a request fails the
/// backend may already have applied part of it; implementations report the
/// failure and leave the rest to the next run.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Fetch every address record, with no page limit
    ///
    /// The compound `address` is split into ip and mask and custom fields
    /// are flattened into [`RegistryIpRecord::extensions`].
    async fn fetch_addresses(&self) -> Result<Vec<RegistryIpRecord>, crate::Error>;

    /// Create address records in one bulk request
    ///
    /// Callers never pass an empty slice; an empty create is skipped by the
    /// engine.
    async fn create_addresses(&self, entries: &[CreateEntry]) -> Result<WriteReceipt, crate::Error>;

    /// Update address records in one bulk request, addressed by id
    ///
    /// An empty slice is a valid request.
    async fn update_addresses(&self, entries: &[PatchEntry]) -> Result<WriteReceipt, crate::Error>;

    /// Backend name (for logging/diagnostics)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing registries from configuration
pub trait RegistryBackendFactory: Send + Sync {
    /// Create a RegistryBackend instance from configuration
    fn create(
        &self,
        config: &RegistryConfig,
        transport: &TransportConfig,
    ) -> Result<Box<dyn RegistryBackend>, crate::Error>;
}
