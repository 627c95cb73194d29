//! View-model reconciler
//!
//! Holds the latest record per backend resource together with an independent error
//! message. A successful result replaces the record wholesale and clears the error; a
//! failed result keeps the last good record and sets the error. Resources never touch
//! each other's slots, so one failing endpoint only degrades its own panel.
//!
//! Reads take a snapshot (clone) under a read lock; callers derive display values from
//! the snapshot and never mutate it back.

use crate::endpoints::{EndpointError, Payload};
use crate::error::{AppResult, DashboardError};
use crate::models::{
    AcquisitionLog, DaqConfig, DaqStats, DeploymentRecord, FileMetadata, SimulatorRecord,
    WriterStatus,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Identifies one reconciled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceId {
    /// `/writer/status`
    WriterStatus,
    /// `/daq/config`
    DaqConfig,
    /// `/daq/stats`
    DaqStats,
    /// `/daq/deployment`
    Deployment,
    /// `/simulation/status`
    Simulator,
    /// `/daq/logs/{n}`
    AcquisitionLog,
    /// `/file/{log_id}`, fetched on demand
    FileMetadata,
}

impl ResourceId {
    /// Every resource the reconciler tracks.
    pub const ALL: [ResourceId; 7] = [
        ResourceId::WriterStatus,
        ResourceId::DaqConfig,
        ResourceId::DaqStats,
        ResourceId::Deployment,
        ResourceId::Simulator,
        ResourceId::AcquisitionLog,
        ResourceId::FileMetadata,
    ];

    /// Human readable name used in logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceId::WriterStatus => "writer status",
            ResourceId::DaqConfig => "daq config",
            ResourceId::DaqStats => "daq stats",
            ResourceId::Deployment => "deployment",
            ResourceId::Simulator => "simulator",
            ResourceId::AcquisitionLog => "acquisition log",
            ResourceId::FileMetadata => "file metadata",
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest record of one resource plus its error flag.
///
/// `error` must be checked before trusting `record`: while it is set, `record` is the
/// last good value, not the current backend state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState<T> {
    /// Last successfully received record (defaults until the first success)
    pub record: T,
    /// Message of the most recent failure, cleared by the next success
    pub error: Option<String>,
    /// When `record` was last replaced
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T: Default> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            record: T::default(),
            error: None,
            updated_at: None,
        }
    }
}

impl<T> ResourceState<T> {
    /// Whether a record has ever been received.
    pub fn has_record(&self) -> bool {
        self.updated_at.is_some()
    }

    /// Whether the last poll failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn succeed(&mut self, record: T) {
        self.record = record;
        self.error = None;
        self.updated_at = Some(Utc::now());
    }

    fn fail(&mut self, message: String) {
        self.error = Some(message);
    }
}

/// Typed state of every resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewModel {
    /// Writer and current acquisition
    pub writer: ResourceState<WriterStatus>,
    /// DAQ configuration
    pub daq_config: ResourceState<DaqConfig>,
    /// Detector/writer throughput
    pub daq_stats: ResourceState<DaqStats>,
    /// Last configuration deployment
    pub deployment: ResourceState<DeploymentRecord>,
    /// UDP simulator
    pub simulator: ResourceState<SimulatorRecord>,
    /// Most recent acquisitions
    pub acquisition_log: ResourceState<AcquisitionLog>,
    /// Metadata of the file opened in the file viewer
    pub file_metadata: ResourceState<FileMetadata>,
}

/// Untyped view of one resource's state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    /// Current record
    pub record: Payload,
    /// Current error message
    pub error: Option<String>,
    /// When the record was last replaced
    pub updated_at: Option<DateTime<Utc>>,
}

impl ViewModel {
    fn set_error(&mut self, resource: ResourceId, message: String) {
        match resource {
            ResourceId::WriterStatus => self.writer.fail(message),
            ResourceId::DaqConfig => self.daq_config.fail(message),
            ResourceId::DaqStats => self.daq_stats.fail(message),
            ResourceId::Deployment => self.deployment.fail(message),
            ResourceId::Simulator => self.simulator.fail(message),
            ResourceId::AcquisitionLog => self.acquisition_log.fail(message),
            ResourceId::FileMetadata => self.file_metadata.fail(message),
        }
    }

    fn apply(&mut self, payload: Payload) {
        match payload {
            Payload::WriterStatus(record) => self.writer.succeed(record),
            Payload::DaqConfig(record) => self.daq_config.succeed(record),
            Payload::DaqStats(record) => self.daq_stats.succeed(record),
            Payload::Deployment(record) => self.deployment.succeed(record),
            Payload::Simulator(record) => self.simulator.succeed(record),
            Payload::AcquisitionLog(record) => self.acquisition_log.succeed(record),
            Payload::FileMetadata(record) => self.file_metadata.succeed(record),
        }
    }

    /// Untyped snapshot of `resource`.
    pub fn get(&self, resource: ResourceId) -> ResourceSnapshot {
        fn snap<T: Clone>(
            state: &ResourceState<T>,
            wrap: fn(T) -> Payload,
        ) -> ResourceSnapshot {
            ResourceSnapshot {
                record: wrap(state.record.clone()),
                error: state.error.clone(),
                updated_at: state.updated_at,
            }
        }

        match resource {
            ResourceId::WriterStatus => snap(&self.writer, Payload::WriterStatus),
            ResourceId::DaqConfig => snap(&self.daq_config, Payload::DaqConfig),
            ResourceId::DaqStats => snap(&self.daq_stats, Payload::DaqStats),
            ResourceId::Deployment => snap(&self.deployment, Payload::Deployment),
            ResourceId::Simulator => snap(&self.simulator, Payload::Simulator),
            ResourceId::AcquisitionLog => snap(&self.acquisition_log, Payload::AcquisitionLog),
            ResourceId::FileMetadata => snap(&self.file_metadata, Payload::FileMetadata),
        }
    }
}

/// Shared, lock-protected [`ViewModel`].
#[derive(Debug, Default)]
pub struct Reconciler {
    model: RwLock<ViewModel>,
}

impl Reconciler {
    /// Empty view model: every record defaulted, no errors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one adapter result to `resource`.
    ///
    /// Fails only when a successful payload belongs to a different resource; the view
    /// model is left untouched in that case.
    pub fn update(
        &self,
        resource: ResourceId,
        result: Result<Payload, EndpointError>,
    ) -> AppResult<()> {
        self.update_while(&AtomicBool::new(true), resource, result).map(|_| ())
    }

    /// [`update`](Self::update), applied only if `live` is still set.
    ///
    /// `live` is read under the write lock: once it is cleared, a following
    /// [`clear`](Self::clear) cannot be overwritten by a result settling concurrently.
    /// Returns whether the result was applied.
    pub fn update_while(
        &self,
        live: &AtomicBool,
        resource: ResourceId,
        result: Result<Payload, EndpointError>,
    ) -> AppResult<bool> {
        if let Ok(payload) = &result {
            let found = payload.resource_id();
            if found != resource {
                return Err(DashboardError::PayloadMismatch {
                    expected: resource,
                    found,
                });
            }
        }

        let mut model = self.model.write();
        if !live.load(Ordering::Acquire) {
            return Ok(false);
        }
        match result {
            Ok(payload) => {
                model.apply(payload);
                debug!(resource = %resource, "Resource updated");
            }
            Err(err) => {
                let message = err.to_string();
                warn!(resource = %resource, error = %message, "Resource poll failed");
                model.set_error(resource, message);
            }
        }
        Ok(true)
    }

    /// Record and error of one resource.
    pub fn get_state(&self, resource: ResourceId) -> ResourceSnapshot {
        self.model.read().get(resource)
    }

    /// Consistent copy of every resource.
    pub fn snapshot(&self) -> ViewModel {
        self.model.read().clone()
    }

    /// Writer state.
    pub fn writer(&self) -> ResourceState<WriterStatus> {
        self.model.read().writer.clone()
    }

    /// DAQ config state.
    pub fn daq_config(&self) -> ResourceState<DaqConfig> {
        self.model.read().daq_config.clone()
    }

    /// DAQ stats state.
    pub fn daq_stats(&self) -> ResourceState<DaqStats> {
        self.model.read().daq_stats.clone()
    }

    /// Deployment state.
    pub fn deployment(&self) -> ResourceState<DeploymentRecord> {
        self.model.read().deployment.clone()
    }

    /// Simulator state.
    pub fn simulator(&self) -> ResourceState<SimulatorRecord> {
        self.model.read().simulator.clone()
    }

    /// Acquisition log state.
    pub fn acquisition_log(&self) -> ResourceState<AcquisitionLog> {
        self.model.read().acquisition_log.clone()
    }

    /// File metadata state.
    pub fn file_metadata(&self) -> ResourceState<FileMetadata> {
        self.model.read().file_metadata.clone()
    }

    /// Drop every record and error (panel teardown).
    pub fn clear(&self) {
        *self.model.write() = ViewModel::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SimulatorStatus;

    fn simulator(status: &str) -> Payload {
        Payload::Simulator(SimulatorRecord {
            status: SimulatorStatus::from(status),
            ..Default::default()
        })
    }

    #[test]
    fn success_replaces_record_and_clears_error() {
        let reconciler = Reconciler::new();
        reconciler
            .update(
                ResourceId::Simulator,
                Err(EndpointError::Transport("refused".into())),
            )
            .unwrap();
        assert!(reconciler.simulator().is_error());
        assert!(!reconciler.simulator().has_record());

        reconciler
            .update(ResourceId::Simulator, Ok(simulator("READY")))
            .unwrap();
        let state = reconciler.simulator();
        assert_eq!(state.error, None);
        assert_eq!(state.record.status, SimulatorStatus::Ready);
        assert!(state.has_record());
    }

    #[test]
    fn failure_keeps_last_good_record() {
        let reconciler = Reconciler::new();
        reconciler
            .update(ResourceId::Simulator, Ok(simulator("STREAMING")))
            .unwrap();
        reconciler
            .update(
                ResourceId::Simulator,
                Err(EndpointError::Backend("Simulator crashed.".into())),
            )
            .unwrap();

        let state = reconciler.get_state(ResourceId::Simulator);
        assert_eq!(state.record, simulator("STREAMING"));
        assert_eq!(state.error.as_deref(), Some("Simulator crashed."));
    }

    #[test]
    fn mismatched_payload_is_rejected_without_side_effects() {
        let reconciler = Reconciler::new();
        let before = reconciler.snapshot();
        let err = reconciler
            .update(ResourceId::DaqStats, Ok(simulator("READY")))
            .unwrap_err();
        assert!(matches!(
            err,
            DashboardError::PayloadMismatch {
                expected: ResourceId::DaqStats,
                found: ResourceId::Simulator
            }
        ));
        assert_eq!(reconciler.snapshot(), before);
    }

    #[test]
    fn errors_are_isolated_per_resource() {
        let reconciler = Reconciler::new();
        for resource in ResourceId::ALL {
            reconciler
                .update(resource, Err(EndpointError::Transport("down".into())))
                .unwrap();
        }
        reconciler
            .update(ResourceId::Simulator, Ok(simulator("READY")))
            .unwrap();

        for resource in ResourceId::ALL {
            let state = reconciler.get_state(resource);
            assert_eq!(
                state.error.is_none(),
                resource == ResourceId::Simulator,
                "{resource}"
            );
        }
    }

    #[test]
    fn clear_discards_everything() {
        let reconciler = Reconciler::new();
        reconciler
            .update(ResourceId::Simulator, Ok(simulator("READY")))
            .unwrap();
        reconciler.clear();
        assert_eq!(reconciler.snapshot(), ViewModel::default());
    }

    #[test]
    fn result_after_stop_and_clear_is_not_applied() {
        let reconciler = Reconciler::new();
        let live = AtomicBool::new(true);
        assert!(reconciler
            .update_while(&live, ResourceId::Simulator, Ok(simulator("READY")))
            .unwrap());

        live.store(false, Ordering::Release);
        reconciler.clear();
        assert!(!reconciler
            .update_while(&live, ResourceId::Simulator, Ok(simulator("STREAMING")))
            .unwrap());
        assert!(!reconciler
            .update_while(
                &live,
                ResourceId::Simulator,
                Err(EndpointError::Transport("late".into()))
            )
            .unwrap());
        assert_eq!(reconciler.snapshot(), ViewModel::default());
    }

    #[test]
    fn concurrent_results_never_survive_stop_then_clear() {
        let reconciler = Reconciler::new();
        let live = AtomicBool::new(true);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let _ = reconciler.update_while(
                            &live,
                            ResourceId::Simulator,
                            Ok(simulator("STREAMING")),
                        );
                    }
                });
            }
            std::thread::yield_now();
            live.store(false, Ordering::Release);
            reconciler.clear();
        });

        assert_eq!(reconciler.snapshot(), ViewModel::default());
    }
}
