//! Reconciliation of Poller and Registry snapshots
//!
//! Everything in this module is a pure function of its inputs:
//!
//! - [`diff`]: Poller devices whose address the Registry does not know
//! - [`create_plan`]: host-route create entries for those devices
//! - [`outer_join`]: every address from either side, paired up
//! - [`join`]: the outer join reduced to rows that can be patched
//!
//! Address matching is exact string equality. `10.0.0.1` and `10.0.0.01` are
//! different keys, and no prefix containment is considered.

use crate::records::{
    AddressStatus, CreateEntry, DeviceId, PatchEntry, PollerDevice, PollingMetadata, RegistryId,
    RegistryIpRecord,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Poller devices whose address has no Registry counterpart
///
/// Devices without an address are skipped. Input order is preserved.
pub fn diff(poller: &[PollerDevice], registry: &[RegistryIpRecord]) -> Vec<PollerDevice> {
    let known: HashSet<&str> = registry.iter().map(|r| r.ip.as_str()).collect();

    poller
        .iter()
        .filter(|device| match device.address() {
            Some(ip) => !known.contains(ip),
            None => false,
        })
        .cloned()
        .collect()
}

/// Create entries derived from a to-create set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePlan {
    /// One host-route entry per distinct address
    pub entries: Vec<CreateEntry>,
    /// Addresses reported by more than one device
    pub duplicate_addresses: Vec<String>,
}

impl CreatePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build one `/32` create entry per distinct address
pub fn create_plan(to_create: &[PollerDevice]) -> CreatePlan {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    let mut entries = Vec::new();

    for ip in to_create.iter().filter_map(PollerDevice::address) {
        if seen.insert(ip) {
            entries.push(CreateEntry::host_route(ip));
        } else {
            duplicates.insert(ip.to_string());
        }
    }

    CreatePlan {
        entries,
        duplicate_addresses: duplicates.into_iter().collect(),
    }
}

/// One row of the outer join on address
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub ip: String,
    pub registry: Option<RegistryIpRecord>,
    pub device: Option<PollerDevice>,
}

/// Outer join of both snapshots on address
///
/// Every address present on either side appears at least once. An address
/// held by several records on one side yields the cross product with the
/// other side. Rows come out ordered by address, then device id, then
/// registry id, independent of input order. Devices without an address have
/// no key and are left out.
pub fn outer_join(poller: &[PollerDevice], registry: &[RegistryIpRecord]) -> Vec<JoinedRow> {
    let mut by_ip_registry: BTreeMap<&str, Vec<&RegistryIpRecord>> = BTreeMap::new();
    for record in registry {
        by_ip_registry.entry(record.ip.as_str()).or_default().push(record);
    }

    let mut by_ip_poller: BTreeMap<&str, Vec<&PollerDevice>> = BTreeMap::new();
    for device in poller {
        if let Some(ip) = device.address() {
            by_ip_poller.entry(ip).or_default().push(device);
        }
    }

    let keys: BTreeSet<&str> = by_ip_registry
        .keys()
        .chain(by_ip_poller.keys())
        .copied()
        .collect();

    let mut rows = Vec::new();
    for ip in keys {
        let records = by_ip_registry.get(ip).map(Vec::as_slice).unwrap_or(&[]);
        let devices = by_ip_poller.get(ip).map(Vec::as_slice).unwrap_or(&[]);

        let mut group = Vec::new();
        match (records.is_empty(), devices.is_empty()) {
            (false, false) => {
                for record in records {
                    for device in devices {
                        group.push(JoinedRow {
                            ip: ip.to_string(),
                            registry: Some((*record).clone()),
                            device: Some((*device).clone()),
                        });
                    }
                }
            }
            (false, true) => {
                for record in records {
                    group.push(JoinedRow {
                        ip: ip.to_string(),
                        registry: Some((*record).clone()),
                        device: None,
                    });
                }
            }
            (true, false) => {
                for device in devices {
                    group.push(JoinedRow {
                        ip: ip.to_string(),
                        registry: None,
                        device: Some((*device).clone()),
                    });
                }
            }
            (true, true) => {}
        }

        group.sort_by_key(|row| {
            (
                row.device.as_ref().and_then(|d| d.device_id),
                row.registry.as_ref().map(|r| r.id),
            )
        });
        rows.extend(group);
    }

    rows
}

/// A Registry record paired with the device whose metadata it receives
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRow {
    pub ip: String,
    pub registry_id: RegistryId,
    pub device_id: DeviceId,
    pub device: PollerDevice,
}

impl PatchRow {
    /// Build the update entry for this row
    pub fn to_entry(&self) -> PatchEntry {
        PatchEntry {
            id: self.registry_id,
            status: AddressStatus::Active,
            custom_fields: PollingMetadata::from_device(self.device_id, &self.device),
        }
    }
}

/// A Registry record that more than one device joins to
///
/// Each device produces its own update entry; the backend applies them in
/// order, so the last one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAddress {
    pub ip: String,
    pub registry_id: RegistryId,
    pub device_ids: Vec<DeviceId>,
}

/// Result of the join step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchPlan {
    /// Rows that become update entries
    pub rows: Vec<PatchRow>,
    /// Identified devices whose address has no Registry record
    pub unmatched: Vec<PollerDevice>,
    /// Registry records targeted by several devices
    pub shared_addresses: Vec<SharedAddress>,
    /// Addressed devices that carry no device id
    pub unidentified: usize,
    /// Devices that carry no address
    pub unaddressed: usize,
}

impl PatchPlan {
    /// Update entries in row order
    pub fn entries(&self) -> Vec<PatchEntry> {
        self.rows.iter().map(PatchRow::to_entry).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Join both snapshots and keep the rows that carry a Poller identity
///
/// Registry-only rows are dropped, as are devices with a null `device_id`.
/// Identified devices with no Registry record end up in
/// [`PatchPlan::unmatched`] since an update cannot address them.
pub fn join(poller: &[PollerDevice], registry: &[RegistryIpRecord]) -> PatchPlan {
    let mut plan = PatchPlan {
        unaddressed: poller.iter().filter(|d| d.address().is_none()).count(),
        unidentified: poller
            .iter()
            .filter(|d| d.address().is_some() && d.device_id.is_none())
            .count(),
        ..PatchPlan::default()
    };

    for row in outer_join(poller, registry) {
        let Some(device) = row.device else {
            continue;
        };
        let Some(device_id) = device.device_id else {
            continue;
        };
        match row.registry {
            Some(record) => plan.rows.push(PatchRow {
                ip: row.ip,
                registry_id: record.id,
                device_id,
                device,
            }),
            None => plan.unmatched.push(device),
        }
    }

    let mut by_record: BTreeMap<RegistryId, (String, Vec<DeviceId>)> = BTreeMap::new();
    for row in &plan.rows {
        by_record
            .entry(row.registry_id)
            .or_insert_with(|| (row.ip.clone(), Vec::new()))
            .1
            .push(row.device_id);
    }
    plan.shared_addresses = by_record
        .into_iter()
        .filter(|(_, (_, ids))| ids.len() > 1)
        .map(|(registry_id, (ip, device_ids))| SharedAddress {
            ip,
            registry_id,
            device_ids,
        })
        .collect();

    plan
}
