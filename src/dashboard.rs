//! Dashboard session
//!
//! Wires the adapters, the poll sessions and the reconciler together for one operator
//! session. `start()` creates one poll session per periodic resource, all feeding the
//! same [`Reconciler`]; panels read views derived from a fresh snapshot on every call.
//! Operator commands (start/stop writer and simulator, config changes, opening a file)
//! go straight to the adapters and apply their returned record immediately so the
//! panel does not wait for the next tick.

use crate::assets::{AssetDialog, AssetFetcher, AssetStore};
use crate::config::{DashboardConfig, PanelConfig};
use crate::endpoints::{Endpoints, Payload, ResourceRequest};
use crate::error::{AppResult, DashboardError};
use crate::models::{DaqConfig, FileMetadata, SimulatorRecord, WriteRequest, WriterStatus};
use crate::poller::{self, PollHandle, PollSession, POLL_INTERVAL};
use crate::reconciler::{Reconciler, ResourceId, ViewModel};
use crate::validation::{output_file_for, validate_write_request};
use crate::views::{self, LiveStreamView};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Writer-control state scoped to one dashboard session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardContext {
    last_output_folder: String,
    n_images: u64,
}

impl DashboardContext {
    /// Context pre-filled with the configured defaults.
    pub fn from_config(config: &PanelConfig) -> Self {
        Self {
            last_output_folder: config.default_output_folder.clone(),
            n_images: config.default_n_images,
        }
    }

    /// Folder of the last write request (or the configured default).
    pub fn last_output_folder(&self) -> &str {
        &self.last_output_folder
    }

    /// Image count of the last write request (or the configured default).
    pub fn n_images(&self) -> u64 {
        self.n_images
    }
}

/// One operator session against one backend.
pub struct Dashboard {
    endpoints: Endpoints,
    panel: PanelConfig,
    reconciler: Arc<Reconciler>,
    context: Mutex<DashboardContext>,
    sessions: Mutex<Vec<PollHandle>>,
    assets: AssetFetcher,
}

impl Dashboard {
    /// Session using `endpoints`; nothing is polled until [`start`](Self::start).
    pub fn new(endpoints: Endpoints, config: &DashboardConfig) -> Self {
        let assets = AssetFetcher::new(endpoints.clone(), AssetStore::new());
        Self {
            endpoints,
            panel: config.dashboard.clone(),
            reconciler: Arc::new(Reconciler::new()),
            context: Mutex::new(DashboardContext::from_config(&config.dashboard)),
            sessions: Mutex::new(Vec::new()),
            assets,
        }
    }

    /// Resources refreshed every [`POLL_INTERVAL`].
    pub fn periodic_requests(&self) -> Vec<ResourceRequest> {
        vec![
            ResourceRequest::WriterStatus,
            ResourceRequest::DaqConfig,
            ResourceRequest::DaqStats,
            ResourceRequest::Deployment,
            ResourceRequest::Simulator,
            ResourceRequest::AcquisitionLog {
                n: self.panel.acquisition_log_entries,
            },
        ]
    }

    /// Start one poll session per periodic resource. Calling it again while running
    /// does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut sessions = self.sessions.lock();
        if !sessions.is_empty() {
            warn!("Dashboard already started");
            return;
        }

        for request in self.periodic_requests() {
            let endpoints = self.endpoints.clone();
            let resource_id = request.resource_id();
            let handle = poller::start(
                resource_id,
                move || {
                    let endpoints = endpoints.clone();
                    let request = request.clone();
                    async move { endpoints.fetch(&request).await }
                },
                POLL_INTERVAL,
                self.reconciler.clone(),
            );
            sessions.push(handle);
        }
        info!(sessions = sessions.len(), "Dashboard started");
    }

    /// Stop every poll session and discard the reconciled records.
    pub fn shutdown(&self) {
        let handles: Vec<PollHandle> = self.sessions.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in &handles {
            handle.stop();
        }
        self.reconciler.clear();
        info!("Dashboard stopped");
    }

    /// Running poll sessions.
    pub fn sessions(&self) -> Vec<Arc<PollSession>> {
        self.sessions
            .lock()
            .iter()
            .map(|handle| handle.session().clone())
            .collect()
    }

    /// The shared reconciler.
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Consistent copy of every resource.
    pub fn snapshot(&self) -> ViewModel {
        self.reconciler.snapshot()
    }

    /// Writer-control context.
    pub fn context(&self) -> DashboardContext {
        self.context.lock().clone()
    }

    /// Resources whose last poll failed, with their messages.
    pub fn errors(&self) -> Vec<(ResourceId, String)> {
        let model = self.snapshot();
        ResourceId::ALL
            .into_iter()
            .filter_map(|id| model.get(id).error.map(|message| (id, message)))
            .collect()
    }

    /// Writer panel.
    pub fn writer_view(&self) -> views::WriterView {
        views::writer_view(&self.snapshot())
    }

    /// Acquisition panel.
    pub fn acquisition_view(&self) -> views::AcquisitionView {
        views::acquisition_view(&self.snapshot())
    }

    /// Deployment panel.
    pub fn deployment_view(&self) -> views::DeploymentView {
        views::deployment_view(&self.snapshot())
    }

    /// Simulator panel.
    pub fn simulator_view(&self) -> views::SimulatorView {
        views::simulator_view(&self.snapshot())
    }

    /// Throughput panel.
    pub fn stats_view(&self) -> views::StatsView {
        views::stats_view(&self.snapshot())
    }

    /// Configuration panel.
    pub fn config_view(&self) -> Option<views::ConfigView> {
        views::config_view(&self.snapshot())
    }

    /// Acquisition log panel.
    pub fn log_view(&self) -> views::LogView {
        views::log_view(&self.snapshot())
    }

    /// File viewer header.
    pub fn file_view(&self) -> Option<views::FileView> {
        views::file_view(&self.snapshot())
    }

    /// Live stream panel.
    pub fn live_stream(&self) -> LiveStreamView {
        LiveStreamView::new(self.endpoints.live_stream_url())
    }

    /// A frame / module-map dialog sharing this session's asset store.
    pub fn asset_dialog(&self) -> AssetDialog {
        AssetDialog::new(self.assets.clone())
    }

    /// Registry of the session's binary assets.
    pub fn asset_store(&self) -> &AssetStore {
        self.assets.store()
    }

    /// Build, validate and send a write request for `n_images` into `folder`.
    ///
    /// The file is `{folder}/{run_id}.h5`; without a run id the request time in
    /// nanoseconds is used. The folder and image count are remembered once the request
    /// passes validation.
    pub async fn start_writing(
        &self,
        n_images: u64,
        folder: &str,
        run_id: Option<u64>,
    ) -> AppResult<WriterStatus> {
        let run_id = run_id.unwrap_or_else(|| {
            Utc::now()
                .timestamp_nanos_opt()
                .map_or(0, |nanos| nanos.unsigned_abs())
        });
        let request = WriteRequest {
            n_images,
            output_file: output_file_for(folder, run_id),
            run_id: Some(run_id),
        };
        validate_write_request(&request)?;

        {
            let mut context = self.context.lock();
            context.last_output_folder = folder.to_string();
            context.n_images = n_images;
        }

        info!(n_images, output_file = %request.output_file, "Starting writer");
        let status = self.endpoints.start_writer(&request).await?;
        self.apply(Payload::WriterStatus(status.clone()))?;
        Ok(status)
    }

    /// Stop the writer.
    pub async fn stop_writing(&self) -> AppResult<WriterStatus> {
        info!("Stopping writer");
        let status = self.endpoints.stop_writer().await?;
        self.apply(Payload::WriterStatus(status.clone()))?;
        Ok(status)
    }

    /// Start the UDP simulator.
    pub async fn start_simulator(&self) -> AppResult<SimulatorRecord> {
        info!("Starting simulator");
        let record = self.endpoints.start_simulator().await?;
        self.apply(Payload::Simulator(record.clone()))?;
        Ok(record)
    }

    /// Stop the UDP simulator.
    pub async fn stop_simulator(&self) -> AppResult<SimulatorRecord> {
        info!("Stopping simulator");
        let record = self.endpoints.stop_simulator().await?;
        self.apply(Payload::Simulator(record.clone()))?;
        Ok(record)
    }

    /// Send a new DAQ configuration.
    pub async fn set_daq_config(&self, config: &DaqConfig) -> AppResult<DaqConfig> {
        info!(detector = %config.detector_name, "Updating DAQ config");
        let applied = self.endpoints.set_daq_config(config).await?;
        self.apply(Payload::DaqConfig(applied.clone()))?;
        Ok(applied)
    }

    /// Fetch the metadata of the file written by acquisition `log_id` (once, not polled).
    pub async fn open_file(&self, log_id: &str) -> AppResult<FileMetadata> {
        let request = ResourceRequest::FileMetadata {
            log_id: log_id.to_string(),
        };
        let result = self.endpoints.fetch(&request).await;
        self.reconciler
            .update(ResourceId::FileMetadata, result.clone())?;
        match result? {
            Payload::FileMetadata(meta) => Ok(meta),
            other => Err(DashboardError::PayloadMismatch {
                expected: ResourceId::FileMetadata,
                found: other.resource_id(),
            }),
        }
    }

    fn apply(&self, payload: Payload) -> AppResult<()> {
        let resource = payload.resource_id();
        self.reconciler.update(resource, Ok(payload))
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{MockReply, MockTransport};
    use serde_json::json;

    fn dashboard(mock: &Arc<MockTransport>) -> Dashboard {
        Dashboard::new(Endpoints::new(mock.clone()), &DashboardConfig::default())
    }

    #[test]
    fn context_starts_from_config_defaults() {
        let context = DashboardContext::from_config(&PanelConfig::default());
        assert_eq!(context.last_output_folder(), "/tmp/");
        assert_eq!(context.n_images(), 100);
    }

    #[tokio::test]
    async fn start_writing_builds_request_and_records_folder() {
        let mock = Arc::new(MockTransport::new());
        mock.set(
            "/writer/write_async",
            MockReply::ok("writer", json!({"state": "WRITING"})),
        );
        let dashboard = dashboard(&mock);

        let status = dashboard.start_writing(50, "/data/run/", Some(7)).await.unwrap();
        assert_eq!(status.state.as_str(), "WRITING");

        let posted = mock.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(
            posted[0].1,
            json!({"n_images": 50, "output_file": "/data/run/7.h5", "run_id": 7})
        );
        assert_eq!(dashboard.context().last_output_folder(), "/data/run/");
        assert_eq!(dashboard.context().n_images(), 50);
        assert!(dashboard.writer_view().can_stop);
    }

    #[tokio::test]
    async fn invalid_request_is_not_sent() {
        let mock = Arc::new(MockTransport::new());
        let dashboard = dashboard(&mock);

        let err = dashboard.start_writing(0, "/tmp", Some(1)).await.unwrap_err();
        assert!(matches!(err, DashboardError::InvalidWriteRequest(_)));
        let err = dashboard
            .start_writing(10, "relative/dir", Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::InvalidWriteRequest(_)));

        assert!(mock.posted().is_empty());
        assert_eq!(dashboard.context().last_output_folder(), "/tmp/");
    }

    #[tokio::test]
    async fn backend_rejection_surfaces_verbatim() {
        let mock = Arc::new(MockTransport::new());
        mock.set("/simulation/start", MockReply::backend_error("Simulator busy."));
        let dashboard = dashboard(&mock);

        let err = dashboard.start_simulator().await.unwrap_err();
        assert_eq!(err.to_string(), "Simulator busy.");
        assert!(dashboard.errors().is_empty());
    }

    #[tokio::test]
    async fn open_file_reconciles_metadata() {
        let mock = Arc::new(MockTransport::new());
        mock.set(
            "/file/abc",
            MockReply::ok("file_metadata", json!({"log_id": "abc", "n_images": 3})),
        );
        let dashboard = dashboard(&mock);

        let meta = dashboard.open_file("abc").await.unwrap();
        assert_eq!(meta.n_images, 3);
        assert_eq!(dashboard.file_view().map(|v| v.log_id), Some("abc".to_string()));

        let err = dashboard.open_file("missing").await.unwrap_err();
        assert!(matches!(err, DashboardError::Endpoint(_)));
        let view = dashboard.file_view().unwrap();
        assert_eq!(view.log_id, "abc");
        assert!(view.error.is_some());
    }
}
