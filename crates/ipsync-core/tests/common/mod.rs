//! Test doubles and common utilities for sync contract tests
//!
//! The doubles keep an in-memory Registry that assigns ids on create and
//! applies patches, so a run can be checked end to end without HTTP.

#![allow(dead_code)]

use ipsync_core::error::{Error, Result};
use ipsync_core::records::{
    CreateEntry, DeviceId, PatchEntry, PollerDevice, RegistryId, RegistryIpRecord, WriteReceipt,
};
use ipsync_core::traits::{PollerBackend, RegistryBackend};
use ipsync_core::{EngineConfig, SyncEngine, SyncEvent};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// An in-memory Registry that tracks calls
///
/// Clones share state and counters, so a test can keep one handle while the
/// engine owns another.
#[derive(Clone)]
pub struct MockRegistry {
    records: Arc<Mutex<Vec<RegistryIpRecord>>>,
    next_id: Arc<AtomicU64>,
    fetch_call_count: Arc<AtomicUsize>,
    create_requests: Arc<Mutex<Vec<Vec<CreateEntry>>>>,
    update_requests: Arc<Mutex<Vec<Vec<PatchEntry>>>>,
    /// (1-based fetch call, status) to fail
    fail_fetch: Option<(usize, u16)>,
    fail_create: Option<u16>,
    fail_update: Option<u16>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(100)),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
            create_requests: Arc::new(Mutex::new(Vec::new())),
            update_requests: Arc::new(Mutex::new(Vec::new())),
            fail_fetch: None,
            fail_create: None,
            fail_update: None,
        }
    }

    /// Seed a record with a fixed id
    pub fn with_record(self, id: u64, address: &str) -> Self {
        self.records
            .lock()
            .unwrap()
            .push(RegistryIpRecord::from_address(RegistryId(id), address));
        self
    }

    /// Fail the given fetch call (1-based) with an HTTP status
    pub fn failing_fetch(mut self, call: usize, status: u16) -> Self {
        self.fail_fetch = Some((call, status));
        self
    }

    pub fn failing_create(mut self, status: u16) -> Self {
        self.fail_create = Some(status);
        self
    }

    pub fn failing_update(mut self, status: u16) -> Self {
        self.fail_update = Some(status);
        self
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    pub fn create_requests(&self) -> Vec<Vec<CreateEntry>> {
        self.create_requests.lock().unwrap().clone()
    }

    pub fn update_requests(&self) -> Vec<Vec<PatchEntry>> {
        self.update_requests.lock().unwrap().clone()
    }

    /// Id of the record holding an address
    pub fn id_of(&self, ip: &str) -> Option<RegistryId> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.ip == ip)
            .map(|r| r.id)
    }

    /// Custom field value currently stored on a record
    pub fn custom_field(&self, id: RegistryId, field: &str) -> Option<serde_json::Value> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.extensions.get(field).cloned())
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl RegistryBackend for MockRegistry {
    async fn fetch_addresses(&self) -> Result<Vec<RegistryIpRecord>> {
        let call = self.fetch_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((failing_call, status)) = self.fail_fetch
            && failing_call == call
        {
            return Err(Error::unexpected_status(
                "mock-registry",
                "fetch_addresses",
                status,
                "injected failure",
            ));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn create_addresses(&self, entries: &[CreateEntry]) -> Result<WriteReceipt> {
        self.create_requests.lock().unwrap().push(entries.to_vec());
        if let Some(status) = self.fail_create {
            return Err(Error::unexpected_status(
                "mock-registry",
                "create_addresses",
                status,
                "injected failure",
            ));
        }

        let mut records = self.records.lock().unwrap();
        for entry in entries {
            let id = RegistryId(self.next_id.fetch_add(1, Ordering::SeqCst));
            records.push(RegistryIpRecord::from_address(id, &entry.address));
        }
        Ok(WriteReceipt {
            submitted: entries.len(),
            dry_run: false,
        })
    }

    async fn update_addresses(&self, entries: &[PatchEntry]) -> Result<WriteReceipt> {
        self.update_requests.lock().unwrap().push(entries.to_vec());
        if let Some(status) = self.fail_update {
            return Err(Error::unexpected_status(
                "mock-registry",
                "update_addresses",
                status,
                "injected failure",
            ));
        }

        let mut records = self.records.lock().unwrap();
        for entry in entries {
            let fields = serde_json::to_value(&entry.custom_fields)?;
            let fields: BTreeMap<String, serde_json::Value> = serde_json::from_value(fields)?;
            if let Some(record) = records.iter_mut().find(|r| r.id == entry.id) {
                record.extensions.extend(fields);
            }
        }
        Ok(WriteReceipt {
            submitted: entries.len(),
            dry_run: false,
        })
    }

    fn backend_name(&self) -> &'static str {
        "mock-registry"
    }
}

/// A Poller that returns a fixed snapshot or a failure
#[derive(Clone)]
pub struct MockPoller {
    devices: Vec<PollerDevice>,
    fail_status: Option<u16>,
    data_shape_error: bool,
    fetch_call_count: Arc<AtomicUsize>,
}

impl MockPoller {
    pub fn new(devices: Vec<PollerDevice>) -> Self {
        Self {
            devices,
            fail_status: None,
            data_shape_error: false,
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::new(Vec::new())
        }
    }

    /// A poller whose response carries a non-integer device_id
    pub fn malformed() -> Self {
        Self {
            data_shape_error: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PollerBackend for MockPoller {
    async fn fetch_devices(&self) -> Result<Vec<PollerDevice>> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_status {
            return Err(Error::unexpected_status(
                "mock-poller",
                "fetch_devices",
                status,
                "injected failure",
            ));
        }
        if self.data_shape_error {
            DeviceId::from_json(&serde_json::json!(5.5))?;
        }
        Ok(self.devices.clone())
    }

    fn backend_name(&self) -> &'static str {
        "mock-poller"
    }
}

/// Device with an address, id and a couple of metadata fields set
pub fn device(ip: &str, device_id: i64, sys_name: &str) -> PollerDevice {
    let mut device = PollerDevice::new(ip, device_id);
    device.sys_name = serde_json::json!(sys_name);
    device.os = serde_json::json!("ios");
    device.last_polled = serde_json::json!("2024-06-01 12:00:00");
    device
}

/// Build an engine over the given doubles with the default engine config
pub fn engine(registry: &MockRegistry, poller: &MockPoller) -> (SyncEngine, mpsc::Receiver<SyncEvent>) {
    engine_with(registry, poller, EngineConfig::default())
}

pub fn engine_with(
    registry: &MockRegistry,
    poller: &MockPoller,
    config: EngineConfig,
) -> (SyncEngine, mpsc::Receiver<SyncEvent>) {
    SyncEngine::new(Box::new(registry.clone()), Box::new(poller.clone()), &config)
        .expect("engine construction succeeds")
}

/// Drain every event emitted so far
pub fn drain(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
