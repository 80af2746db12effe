//! Plugin-based backend registry
//!
//! The registry maps backend type names to factories so the binary can build
//! the Registry and Poller backends from configuration without hardcoded
//! if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipsync_core::BackendRegistry;
//!
//! let backends = BackendRegistry::new();
//! ipsync_registry_netbox::register(&backends);
//! ipsync_poller_librenms::register(&backends);
//!
//! let registry = backends.create_registry(&config.registry, &config.transport)?;
//! let poller = backends.create_poller(&config.poller, &config.transport)?;
//! ```

use crate::config::{PollerConfig, RegistryConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::traits::{PollerBackend, PollerBackendFactory, RegistryBackend, RegistryBackendFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Backend registry for plugin-based backend creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct BackendRegistry {
    /// Registered Registry backend factories
    registries: RwLock<HashMap<String, Box<dyn RegistryBackendFactory>>>,

    /// Registered Poller backend factories
    pollers: RwLock<HashMap<String, Box<dyn PollerBackendFactory>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Registry backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "netbox")
    /// - `factory`: Factory object for creating backend instances
    pub fn register_registry(&self, name: impl Into<String>, factory: Box<dyn RegistryBackendFactory>) {
        let mut registries = self.registries.write().unwrap_or_else(PoisonError::into_inner);
        registries.insert(name.into(), factory);
    }

    /// Register a Poller backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "librenms")
    /// - `factory`: Factory object for creating backend instances
    pub fn register_poller(&self, name: impl Into<String>, factory: Box<dyn PollerBackendFactory>) {
        let mut pollers = self.pollers.write().unwrap_or_else(PoisonError::into_inner);
        pollers.insert(name.into(), factory);
    }

    /// Create a Registry backend from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn RegistryBackend>)`: Created backend instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_registry(
        &self,
        config: &RegistryConfig,
        transport: &TransportConfig,
    ) -> Result<Box<dyn RegistryBackend>> {
        let registry_type = config.type_name();
        let registries = self.registries.read().unwrap_or_else(PoisonError::into_inner);

        let factory = registries
            .get(registry_type)
            .ok_or_else(|| Error::config(format!("Unknown registry type: {}", registry_type)))?;

        factory.create(config, transport)
    }

    /// Create a Poller backend from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn PollerBackend>)`: Created backend instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_poller(
        &self,
        config: &PollerConfig,
        transport: &TransportConfig,
    ) -> Result<Box<dyn PollerBackend>> {
        let poller_type = config.type_name();
        let pollers = self.pollers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = pollers
            .get(poller_type)
            .ok_or_else(|| Error::config(format!("Unknown poller type: {}", poller_type)))?;

        factory.create(config, transport)
    }

    /// List all registered Registry backend types
    pub fn list_registries(&self) -> Vec<String> {
        let registries = self.registries.read().unwrap_or_else(PoisonError::into_inner);
        registries.keys().cloned().collect()
    }

    /// List all registered Poller backend types
    pub fn list_pollers(&self) -> Vec<String> {
        let pollers = self.pollers.read().unwrap_or_else(PoisonError::into_inner);
        pollers.keys().cloned().collect()
    }

    /// Check if a Registry backend type is registered
    pub fn has_registry(&self, name: &str) -> bool {
        let registries = self.registries.read().unwrap_or_else(PoisonError::into_inner);
        registries.contains_key(name)
    }

    /// Check if a Poller backend type is registered
    pub fn has_poller(&self, name: &str) -> bool {
        let pollers = self.pollers.read().unwrap_or_else(PoisonError::into_inner);
        pollers.contains_key(name)
    }
}
