//! Panel views
//!
//! Display values derived from a [`ViewModel`] snapshot. Every function here is pure and
//! recomputed on each read; nothing is cached between polls. Each view carries the error
//! message of the resource it was derived from, and the record it shows is the last good
//! one whenever that error is set.

use crate::classifier::{stream_activity, Classify, StatusBadge};
use crate::classifier::{SimulatorStatus, WriterState};
use crate::metrics::{
    bandwidth_mbps, duration_seconds, elapsed_seconds, fixed2, format_timestamp, frequency_hz,
    progress_percent,
};
use crate::models::{AcquisitionLogEntry, ModuleRect};
use crate::reconciler::ViewModel;
use serde::Serialize;

/// Fallback shown in place of the live stream once it failed to load.
pub const LIVE_STREAM_FAILED: &str = "Live stream failed. Try to reload page.";

/// Writer control panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriterView {
    /// State label and severity
    pub badge: StatusBadge,
    /// Start is only offered while the writer is ready
    pub can_start: bool,
    /// Stop is only offered while the writer is writing
    pub can_stop: bool,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// Current (or last) acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionView {
    /// State label and severity
    pub badge: StatusBadge,
    /// Backend message
    pub message: String,
    /// Completed writes in percent, within `[0, 100]`
    pub progress_percent: f64,
    /// Whole seconds since start, up to stop when stopped
    pub elapsed_seconds: u64,
    /// Images requested for the acquisition
    pub n_images: u64,
    /// Writes requested so far
    pub n_write_requested: u64,
    /// Writes completed so far
    pub n_write_completed: u64,
    /// Target HDF5 file
    pub output_file: String,
    /// Run id, empty when unset
    pub run_id: String,
    /// Formatted start time, `N/A` when unknown
    pub start_time: String,
    /// Formatted stop time, `N/A` while running
    pub stop_time: String,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// Last configuration deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentView {
    /// State label and severity
    pub badge: StatusBadge,
    /// Id of the deployed configuration
    pub deployment_id: String,
    /// Backend message
    pub message: String,
    /// Whole seconds since start, up to stop when stopped
    pub elapsed_seconds: u64,
    /// Formatted start time, `N/A` when unknown
    pub start_time: String,
    /// Formatted stop time, `N/A` while running
    pub stop_time: String,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// Simulator control panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorView {
    /// State label and severity
    pub badge: StatusBadge,
    /// MB/s, two decimals
    pub bandwidth_mbps: String,
    /// Hz, two decimals
    pub frequency_hz: String,
    /// Images generated since the simulator started
    pub n_generated_images: u64,
    /// Start is offered while the simulator is ready
    pub can_start: bool,
    /// Stop is offered while the simulator is streaming
    pub can_stop: bool,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// Detector and writer throughput.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    /// Detector MB/s, two decimals
    pub detector_bandwidth_mbps: String,
    /// Detector images per second, two decimals
    pub detector_frequency_hz: String,
    /// Writer MB/s, two decimals
    pub writer_bandwidth_mbps: String,
    /// Writer writes per second, two decimals
    pub writer_frequency_hz: String,
    /// Streaming while the detector delivers data
    pub activity: StatusBadge,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// One detector module of the configuration panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleView {
    /// Key in `module_positions`
    pub module_id: String,
    /// Position in the assembled image
    pub rect: ModuleRect,
    /// `start_udp_port + module index`, when the id is numeric
    pub udp_port: Option<u32>,
}

/// DAQ configuration panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigView {
    /// Detector family
    pub detector_type: String,
    /// Detector instance name
    pub detector_name: String,
    /// Bits per pixel
    pub bit_depth: u32,
    /// Image height in pixels
    pub image_pixel_height: u32,
    /// Image width in pixels
    pub image_pixel_width: u32,
    /// Number of detector modules
    pub n_modules: u32,
    /// UDP port of module 0
    pub start_udp_port: u32,
    /// Unix user the writer runs as
    pub writer_user_id: u32,
    /// Modules ordered by id
    pub modules: Vec<ModuleView>,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// One row of the acquisition log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntryView {
    /// Acquisition log id
    pub log_id: String,
    /// State label and severity
    pub badge: StatusBadge,
    /// Formatted stop time, `N/A` while running
    pub stop_time: String,
    /// Images requested for the acquisition
    pub n_images: u64,
    /// Target HDF5 file
    pub output_file: String,
    /// Seconds, two decimals
    pub duration: String,
    /// Writer message, `N/A` when empty
    pub message: String,
}

/// Acquisition log panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogView {
    /// Newest first
    pub entries: Vec<LogEntryView>,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// File viewer header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileView {
    /// Acquisition log id
    pub log_id: String,
    /// Stored file name
    pub filename: String,
    /// Size in bytes
    pub file_size: u64,
    /// HDF5 dataset holding the frames
    pub dataset_name: String,
    /// Frames in the dataset
    pub n_images: u64,
    /// Image height in pixels
    pub image_pixel_height: u32,
    /// Image width in pixels
    pub image_pixel_width: u32,
    /// Pixel data type
    pub dtype: String,
    /// Last fetch error of the underlying resource
    pub error: Option<String>,
}

/// Writer panel.
pub fn writer_view(model: &ViewModel) -> WriterView {
    let state = &model.writer.record.state;
    WriterView {
        badge: state.badge(),
        can_start: *state == WriterState::Ready,
        can_stop: *state == WriterState::Writing,
        error: model.writer.error.clone(),
    }
}

/// Acquisition panel.
pub fn acquisition_view(model: &ViewModel) -> AcquisitionView {
    let acquisition = &model.writer.record.acquisition;
    let stats = &acquisition.stats;
    AcquisitionView {
        badge: acquisition.state.badge(),
        message: acquisition.message.clone(),
        progress_percent: progress_percent(
            stats.n_write_completed as f64,
            stats.n_write_requested as f64,
        ),
        elapsed_seconds: elapsed_seconds(stats.start_time, stats.stop_time),
        n_images: acquisition.info.n_images,
        n_write_requested: stats.n_write_requested,
        n_write_completed: stats.n_write_completed,
        output_file: acquisition.info.output_file.clone(),
        run_id: acquisition
            .info
            .run_id
            .as_ref()
            .map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        start_time: format_timestamp(stats.start_time),
        stop_time: format_timestamp(stats.stop_time),
        error: model.writer.error.clone(),
    }
}

/// Deployment panel.
pub fn deployment_view(model: &ViewModel) -> DeploymentView {
    let record = &model.deployment.record;
    DeploymentView {
        badge: record.status.badge(),
        deployment_id: record.deployment_id.clone(),
        message: record.message.clone(),
        elapsed_seconds: elapsed_seconds(record.stats.start_time, record.stats.stop_time),
        start_time: format_timestamp(record.stats.start_time),
        stop_time: format_timestamp(record.stats.stop_time),
        error: model.deployment.error.clone(),
    }
}

/// Simulator panel.
pub fn simulator_view(model: &ViewModel) -> SimulatorView {
    let record = &model.simulator.record;
    SimulatorView {
        badge: record.status.badge(),
        bandwidth_mbps: bandwidth_mbps(record.stats.bytes_per_second),
        frequency_hz: frequency_hz(record.stats.images_per_second),
        n_generated_images: record.stats.n_generated_images,
        can_start: record.status == SimulatorStatus::Ready,
        can_stop: record.status == SimulatorStatus::Streaming,
        error: model.simulator.error.clone(),
    }
}

/// Throughput panel.
pub fn stats_view(model: &ViewModel) -> StatsView {
    let stats = &model.daq_stats.record;
    StatsView {
        detector_bandwidth_mbps: bandwidth_mbps(stats.detector.bytes_per_second),
        detector_frequency_hz: frequency_hz(stats.detector.images_per_second),
        writer_bandwidth_mbps: bandwidth_mbps(stats.writer.bytes_per_second),
        writer_frequency_hz: frequency_hz(stats.writer.images_per_second),
        activity: stream_activity(stats.detector.bytes_per_second),
        error: model.daq_stats.error.clone(),
    }
}

/// Configuration panel; `None` until a configuration has been received.
pub fn config_view(model: &ViewModel) -> Option<ConfigView> {
    if !model.daq_config.has_record() {
        return None;
    }
    let config = &model.daq_config.record;
    let modules = config
        .module_positions
        .iter()
        .map(|(module_id, rect)| ModuleView {
            module_id: module_id.clone(),
            rect: *rect,
            udp_port: module_id
                .parse::<u32>()
                .ok()
                .and_then(|index| config.start_udp_port.checked_add(index)),
        })
        .collect();

    Some(ConfigView {
        detector_type: config.detector_type.clone(),
        detector_name: config.detector_name.clone(),
        bit_depth: config.bit_depth,
        image_pixel_height: config.image_pixel_height,
        image_pixel_width: config.image_pixel_width,
        n_modules: config.n_modules,
        start_udp_port: config.start_udp_port,
        writer_user_id: config.writer_user_id,
        modules,
        error: model.daq_config.error.clone(),
    })
}

fn log_entry_view(entry: &AcquisitionLogEntry) -> LogEntryView {
    let record = &entry.record;
    LogEntryView {
        log_id: entry.log_id.clone(),
        badge: record.state.badge(),
        stop_time: format_timestamp(record.stats.stop_time),
        n_images: record.info.n_images,
        output_file: record.info.output_file.clone(),
        duration: fixed2(duration_seconds(
            record.stats.start_time,
            record.stats.stop_time,
        )),
        message: if record.message.is_empty() {
            "N/A".to_string()
        } else {
            record.message.clone()
        },
    }
}

/// Acquisition log panel, newest entry first.
pub fn log_view(model: &ViewModel) -> LogView {
    LogView {
        entries: model
            .acquisition_log
            .record
            .entries
            .iter()
            .map(log_entry_view)
            .collect(),
        error: model.acquisition_log.error.clone(),
    }
}

/// File viewer header; `None` until a file has been opened successfully.
pub fn file_view(model: &ViewModel) -> Option<FileView> {
    if !model.file_metadata.has_record() {
        return None;
    }
    let meta = &model.file_metadata.record;
    Some(FileView {
        log_id: meta.log_id.clone(),
        filename: meta.filename.clone(),
        file_size: meta.file_size,
        dataset_name: meta.dataset_name.clone(),
        n_images: meta.n_images,
        image_pixel_height: meta.image_pixel_height,
        image_pixel_width: meta.image_pixel_width,
        dtype: meta.dtype.clone(),
        error: model.file_metadata.error.clone(),
    })
}

/// Load state of the MJPEG live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveStreamState {
    /// Stream source is set and assumed to be playing
    Playing,
    /// The stream failed to load; the fallback message is shown
    Failed,
}

/// Live stream panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveStreamView {
    url: String,
    state: LiveStreamState,
}

impl LiveStreamView {
    /// Panel showing the stream at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: LiveStreamState::Playing,
        }
    }

    /// Stream URL (displayed directly, never polled).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current load state.
    pub fn state(&self) -> LiveStreamState {
        self.state
    }

    /// The display reported a load error.
    pub fn report_failure(&mut self) {
        self.state = LiveStreamState::Failed;
    }

    /// Try to load the stream again.
    pub fn retry(&mut self) {
        self.state = LiveStreamState::Playing;
    }

    /// Fallback text while failed.
    pub fn fallback_message(&self) -> Option<&'static str> {
        match self.state {
            LiveStreamState::Playing => None,
            LiveStreamState::Failed => Some(LIVE_STREAM_FAILED),
        }
    }
}
