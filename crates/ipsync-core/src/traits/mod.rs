//! Core traits for ipsync
//!
//! This module defines the abstract interfaces that every backend implements.
//!
//! - [`RegistryBackend`]: read, create and update address records of record
//! - [`PollerBackend`]: read the devices a poller has discovered

pub mod registry_backend;
pub mod poller_backend;

pub use registry_backend::{RegistryBackend, RegistryBackendFactory};
pub use poller_backend::{PollerBackend, PollerBackendFactory};
