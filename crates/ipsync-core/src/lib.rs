// # ipsync-core
//
// Core library for reconciling a NetBox-style IP address registry with a
// LibreNMS-style device poller.
//
// ## Architecture Overview
//
// - **RegistryBackend**: Trait for reading and writing address records of record
// - **PollerBackend**: Trait for reading discovered devices
// - **reconcile**: Pure diff and join over the two snapshots
// - **SyncEngine**: Sequences fetch → diff → create → refetch → join → patch
// - **BackendRegistry**: Plugin-based registry for backend factories
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Reconciliation is pure; backends only talk HTTP
// 2. **Single-shot calls**: No retry or backoff anywhere; a run is one attempt
// 3. **Plugin-Based**: Backends are registered by name, no hard-coded if-else
// 4. **Library-First**: The binary is a thin layer over this crate
// 5. **Stateless**: Nothing survives a run; every run starts from fresh snapshots

pub mod traits;
pub mod engine;
pub mod reconcile;
pub mod records;
pub mod registry;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{PollerBackend, RegistryBackend};
pub use engine::{RunOutcome, RunReport, SyncEngine, SyncEvent, SyncStage, SyncStep};
pub use registry::BackendRegistry;
pub use config::{EngineConfig, PollerConfig, RegistryConfig, SyncConfig, TransportConfig};
pub use error::{Error, Result};
pub use records::{DeviceId, PollerDevice, RegistryId, RegistryIpRecord};
