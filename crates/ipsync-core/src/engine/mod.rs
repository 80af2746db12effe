//! Sync engine
//!
//! The SyncEngine runs one reconciliation pass:
//! - Fetching the Registry and Poller snapshots
//! - Diffing them to find addresses the Registry lacks
//! - Creating those addresses as host routes
//! - Refetching the Registry when anything was created
//! - Joining the snapshots and patching polling metadata into the Registry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐       ┌──────────────┐
//! │   Registry   │       │    Poller    │
//! │ (fetch/write)│       │   (fetch)    │
//! └──────────────┘       └──────────────┘
//!        ▲   │                  │
//!        │   └───── snapshots ──┤
//!        │                      ▼
//!        │              ┌──────────────┐
//!        └── writes ────│  SyncEngine  │─── SyncEvent ──▶ observers
//!                       └──────────────┘
//!                              │
//!                              ▼
//!                       ┌──────────────┐
//!                       │  reconcile   │
//!                       │ (diff/join)  │
//!                       └──────────────┘
//! ```
//!
//! ## Stages
//!
//! `Start → FetchedBoth → Diffed → Created → (RefetchedRegistry) → Joined →
//! Patched → Done`, with `Aborted` reachable from any fetch.
//!
//! A failed fetch aborts the run: an empty snapshot would read as "everything
//! is missing". A failed write is recorded and the run carries on, since the
//! later steps still make progress against whatever the Registry holds.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::reconcile::{self, PatchPlan};
use crate::records::{PollerDevice, RegistryId, RegistryIpRecord};
use crate::traits::{PollerBackend, RegistryBackend};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared addresses reported individually on the event channel per run
///
/// The rest only reach the log and the report count.
pub const MAX_SHARED_ADDRESS_EVENTS: usize = 100;

/// Position of a run in the sync state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Start,
    FetchedBoth,
    Diffed,
    Created,
    RefetchedRegistry,
    Joined,
    Patched,
    Done,
    Aborted,
}

/// A remote call made during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    FetchRegistry,
    FetchPoller,
    CreateAddresses,
    RefetchRegistry,
    UpdateAddresses,
}

impl SyncStep {
    /// Operation name used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::FetchRegistry => "fetch_registry",
            SyncStep::FetchPoller => "fetch_poller",
            SyncStep::CreateAddresses => "create_addresses",
            SyncStep::RefetchRegistry => "refetch_registry",
            SyncStep::UpdateAddresses => "update_addresses",
        }
    }
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: SyncStep,
    pub backend: String,
    pub error: String,
    /// HTTP status, when the backend answered
    pub status: Option<u16>,
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step that ran succeeded
    Success,
    /// Every step ran, at least one write failed
    Partial,
    /// A fetch failed and the run stopped there
    Aborted,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Last stage reached
    pub stage: SyncStage,
    /// Records in the Registry snapshot the join used
    pub registry_records: usize,
    pub poller_devices: usize,
    /// Devices whose address the Registry lacked
    pub to_create: usize,
    /// Create entries acknowledged by the Registry
    pub created: usize,
    /// Update entries acknowledged by the Registry
    pub patched: usize,
    pub unmatched: usize,
    pub shared_addresses: usize,
    /// True if any write was logged instead of sent
    pub dry_run: bool,
    pub failures: Vec<StepFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            outcome: RunOutcome::Success,
            stage: SyncStage::Start,
            registry_records: 0,
            poller_devices: 0,
            to_create: 0,
            created: 0,
            patched: 0,
            unmatched: 0,
            shared_addresses: 0,
            dry_run: false,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Failure recorded for a step, if any
    pub fn failure(&self, step: SyncStep) -> Option<&StepFailure> {
        self.failures.iter().find(|f| f.step == step)
    }
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Run started
    Started,

    /// Stage transition
    StageReached { stage: SyncStage },

    /// Snapshot fetched
    Fetched {
        step: SyncStep,
        backend: String,
        count: usize,
    },

    /// Bulk write acknowledged
    WriteSubmitted {
        step: SyncStep,
        entries: usize,
        dry_run: bool,
    },

    /// Bulk write not sent because it had no entries
    WriteSkipped { step: SyncStep },

    /// Remote call failed
    StepFailed { step: SyncStep, error: String },

    /// Several devices join to one Registry record
    SharedAddressDetected {
        ip: String,
        registry_id: RegistryId,
        devices: usize,
    },

    /// Run finished
    Finished { outcome: RunOutcome },
}

/// Reconciliation engine
///
/// The engine owns one Registry and one Poller backend and runs the pipeline
/// strictly sequentially: every remote call completes before the next one is
/// issued. It holds no state between runs.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Call [`SyncEngine::run_once()`]
/// 3. Inspect the returned [`RunReport`]
pub struct SyncEngine {
    /// System of record
    registry: Box<dyn RegistryBackend>,

    /// Discovery system
    poller: Box<dyn PollerBackend>,

    /// Submit the update request when there is nothing to patch
    patch_when_empty: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields sync events
    pub fn new(
        registry: Box<dyn RegistryBackend>,
        poller: Box<dyn PollerBackend>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            registry,
            poller,
            patch_when_empty: config.patch_when_empty,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one reconciliation pass
    ///
    /// Never returns an error: every failure is captured in the report so
    /// the caller decides how to surface it.
    pub async fn run_once(&self) -> RunReport {
        let mut report = RunReport::new();
        info!(
            "Initiating sync ({} -> {})",
            self.poller.backend_name(),
            self.registry.backend_name()
        );
        self.emit_event(SyncEvent::Started);

        // Start → FetchedBoth
        let registry_snapshot = match self.fetch_registry(SyncStep::FetchRegistry).await {
            Ok(records) => records,
            Err(failure) => return self.abort(report, failure),
        };
        let devices = match self.fetch_poller().await {
            Ok(devices) => devices,
            Err(failure) => return self.abort(report, failure),
        };
        report.registry_records = registry_snapshot.len();
        report.poller_devices = devices.len();
        self.advance(&mut report, SyncStage::FetchedBoth);

        // FetchedBoth → Diffed
        let to_create = reconcile::diff(&devices, &registry_snapshot);
        report.to_create = to_create.len();
        info!("{} device address(es) missing from {}", to_create.len(), self.registry.backend_name());
        self.advance(&mut report, SyncStage::Diffed);

        // Diffed → Created
        let create_plan = reconcile::create_plan(&to_create);
        for ip in &create_plan.duplicate_addresses {
            warn!("Address {} is reported by more than one device; creating it once", ip);
        }
        if create_plan.is_empty() {
            debug!("Nothing to create, skipping create request");
            self.emit_event(SyncEvent::WriteSkipped {
                step: SyncStep::CreateAddresses,
            });
        } else {
            match self.registry.create_addresses(&create_plan.entries).await {
                Ok(receipt) => {
                    info!("Created {} IP record(s)", receipt.submitted);
                    report.created = receipt.submitted;
                    report.dry_run |= receipt.dry_run;
                    self.emit_event(SyncEvent::WriteSubmitted {
                        step: SyncStep::CreateAddresses,
                        entries: receipt.submitted,
                        dry_run: receipt.dry_run,
                    });
                }
                Err(e) => self.record_write_failure(&mut report, SyncStep::CreateAddresses, e),
            }
        }
        self.advance(&mut report, SyncStage::Created);

        // Created → Joined, refreshing ids first if anything was submitted
        let registry_snapshot = if to_create.is_empty() {
            registry_snapshot
        } else {
            match self.fetch_registry(SyncStep::RefetchRegistry).await {
                Ok(records) => {
                    self.advance(&mut report, SyncStage::RefetchedRegistry);
                    records
                }
                Err(failure) => return self.abort(report, failure),
            }
        };
        report.registry_records = registry_snapshot.len();

        let plan = reconcile::join(&devices, &registry_snapshot);
        self.report_plan(&mut report, &plan);
        self.advance(&mut report, SyncStage::Joined);

        // Joined → Patched
        if plan.is_empty() && !self.patch_when_empty {
            debug!("Nothing to patch, skipping update request");
            self.emit_event(SyncEvent::WriteSkipped {
                step: SyncStep::UpdateAddresses,
            });
        } else {
            match self.registry.update_addresses(&plan.entries()).await {
                Ok(receipt) => {
                    info!("Updated {} IP record(s)", receipt.submitted);
                    report.patched = receipt.submitted;
                    report.dry_run |= receipt.dry_run;
                    self.emit_event(SyncEvent::WriteSubmitted {
                        step: SyncStep::UpdateAddresses,
                        entries: receipt.submitted,
                        dry_run: receipt.dry_run,
                    });
                }
                Err(e) => self.record_write_failure(&mut report, SyncStep::UpdateAddresses, e),
            }
        }
        self.advance(&mut report, SyncStage::Patched);

        // Patched → Done
        report.outcome = if report.failures.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        };
        self.advance(&mut report, SyncStage::Done);
        self.finish(report)
    }

    /// Fetch the Registry snapshot, mapping failure to a step failure
    async fn fetch_registry(
        &self,
        step: SyncStep,
    ) -> std::result::Result<Vec<RegistryIpRecord>, StepFailure> {
        info!("Pulling address records from {}", self.registry.backend_name());
        match self.registry.fetch_addresses().await {
            Ok(records) => {
                info!(
                    "Retrieved {} IP address record(s) from {}",
                    records.len(),
                    self.registry.backend_name()
                );
                self.emit_event(SyncEvent::Fetched {
                    step,
                    backend: self.registry.backend_name().to_string(),
                    count: records.len(),
                });
                Ok(records)
            }
            Err(e) => Err(self.step_failure(step, self.registry.backend_name(), e)),
        }
    }

    /// Fetch the Poller snapshot, mapping failure to a step failure
    async fn fetch_poller(&self) -> std::result::Result<Vec<PollerDevice>, StepFailure> {
        info!("Pulling devices from {}", self.poller.backend_name());
        match self.poller.fetch_devices().await {
            Ok(devices) => {
                info!(
                    "Retrieved {} device record(s) from {}",
                    devices.len(),
                    self.poller.backend_name()
                );
                self.emit_event(SyncEvent::Fetched {
                    step: SyncStep::FetchPoller,
                    backend: self.poller.backend_name().to_string(),
                    count: devices.len(),
                });
                Ok(devices)
            }
            Err(e) => Err(self.step_failure(SyncStep::FetchPoller, self.poller.backend_name(), e)),
        }
    }

    /// Log the join diagnostics and copy counts into the report
    fn report_plan(&self, report: &mut RunReport, plan: &PatchPlan) {
        report.unmatched = plan.unmatched.len();
        report.shared_addresses = plan.shared_addresses.len();

        if plan.unaddressed > 0 {
            warn!("{} device(s) have no IP address and were not reconciled", plan.unaddressed);
        }
        if plan.unidentified > 0 {
            warn!("{} device(s) have no device_id and were not patched", plan.unidentified);
        }
        if !plan.unmatched.is_empty() {
            warn!(
                "{} device(s) have no matching record in {} and were not patched",
                plan.unmatched.len(),
                self.registry.backend_name()
            );
        }
        for shared in &plan.shared_addresses {
            let ids: Vec<String> = shared.device_ids.iter().map(ToString::to_string).collect();
            warn!(
                "Address {} (record {}) is shared by devices [{}]; the last update wins",
                shared.ip,
                shared.registry_id,
                ids.join(", ")
            );
        }
        for shared in plan.shared_addresses.iter().take(MAX_SHARED_ADDRESS_EVENTS) {
            self.emit_event(SyncEvent::SharedAddressDetected {
                ip: shared.ip.clone(),
                registry_id: shared.registry_id,
                devices: shared.device_ids.len(),
            });
        }
        debug!("{} record(s) to patch", plan.rows.len());
    }

    fn step_failure(&self, step: SyncStep, backend: &str, error: Error) -> StepFailure {
        StepFailure {
            step,
            backend: backend.to_string(),
            status: error.status(),
            error: error.to_string(),
        }
    }

    fn record_write_failure(&self, report: &mut RunReport, step: SyncStep, error: Error) {
        let failure = self.step_failure(step, self.registry.backend_name(), error);
        warn!(
            "{} returned an unexpected response in {}: {}",
            failure.backend, step, failure.error
        );
        self.emit_event(SyncEvent::StepFailed {
            step,
            error: failure.error.clone(),
        });
        report.failures.push(failure);
    }

    fn abort(&self, mut report: RunReport, failure: StepFailure) -> RunReport {
        error!(
            "{} failed in {}, aborting sync: {}",
            failure.backend, failure.step, failure.error
        );
        self.emit_event(SyncEvent::StepFailed {
            step: failure.step,
            error: failure.error.clone(),
        });
        report.failures.push(failure);
        report.outcome = RunOutcome::Aborted;
        self.advance(&mut report, SyncStage::Aborted);
        self.finish(report)
    }

    fn finish(&self, mut report: RunReport) -> RunReport {
        report.finished_at = Utc::now();
        match report.outcome {
            RunOutcome::Success => info!(
                "Completed sync: {} created, {} patched",
                report.created, report.patched
            ),
            RunOutcome::Partial => warn!(
                "Completed sync with {} failed write(s): {} created, {} patched",
                report.failures.len(),
                report.created,
                report.patched
            ),
            RunOutcome::Aborted => error!(
                "Sync aborted after {} failed; no further requests were issued",
                report
                    .failures
                    .last()
                    .map(|f| f.step.as_str())
                    .unwrap_or("unknown step")
            ),
        }
        self.emit_event(SyncEvent::Finished {
            outcome: report.outcome,
        });
        report
    }

    fn advance(&self, report: &mut RunReport, stage: SyncStage) {
        debug!("Sync stage {:?} -> {:?}", report.stage, stage);
        report.stage = stage;
        self.emit_event(SyncEvent::StageReached { stage });
    }

    /// Emit a sync event
    fn emit_event(&self, event: SyncEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
