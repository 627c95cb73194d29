//! Typed records for the backend payloads.
//!
//! Every field is lenient: a missing key, an explicit `null` or a value of the wrong
//! type decodes to the field's zero value, so a partially populated payload never leaves a hole for the metrics or
//! formatting code to trip over. State strings decode into the tagged unions from
//! [`crate::classifier`].

use crate::classifier::{AcquisitionState, DeploymentStatus, SimulatorStatus, WriterState};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Decode `null`, a missing value or a value of the wrong shape as `T::default()`.
///
/// One mistyped leaf only zeroes that field; the rest of the record still decodes.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(T::deserialize(value).unwrap_or_else(|e| {
        debug!(error = %e, "Defaulting undecodable payload field");
        T::default()
    }))
}

/// Accept a JSON number or a numeric string as an `f64`, anything else as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// `/writer/status` -> `writer`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterStatus {
    /// Writer state
    #[serde(deserialize_with = "lenient")]
    pub state: WriterState,
    /// Current or last acquisition
    #[serde(deserialize_with = "lenient")]
    pub acquisition: AcquisitionRecord,
}

/// One bounded capture-and-write run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionRecord {
    /// Acquisition state
    #[serde(deserialize_with = "lenient")]
    pub state: AcquisitionState,
    /// The write request that started this run
    #[serde(deserialize_with = "lenient")]
    pub info: AcquisitionInfo,
    /// Counters and timestamps
    #[serde(deserialize_with = "lenient")]
    pub stats: AcquisitionStats,
    /// Free text from the writer ("Completed.", "Interrupted.", "ERROR: ...")
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    /// Ordered writer reports
    #[serde(deserialize_with = "lenient")]
    pub reports: Vec<serde_json::Value>,
}

/// Request parameters echoed back by the writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionInfo {
    /// Number of images requested
    #[serde(deserialize_with = "lenient")]
    pub n_images: u64,
    /// Output file (absolute path)
    #[serde(deserialize_with = "lenient")]
    pub output_file: String,
    /// Run identifier
    #[serde(deserialize_with = "lenient")]
    pub run_id: Option<serde_json::Value>,
}

/// Write counters and Unix timestamps of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionStats {
    /// Start as seen by the writer driver
    #[serde(deserialize_with = "lenient_timestamp")]
    pub start_time: Option<f64>,
    /// Stop as seen by the writer driver
    #[serde(deserialize_with = "lenient_timestamp")]
    pub stop_time: Option<f64>,
    /// Writes handed to the writer
    #[serde(deserialize_with = "lenient")]
    pub n_write_requested: u64,
    /// Writes completed; may transiently exceed `n_write_requested`
    #[serde(deserialize_with = "lenient")]
    pub n_write_completed: u64,
}

/// `/daq/deployment` -> `deployment`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentRecord {
    /// Deployment status
    #[serde(deserialize_with = "lenient")]
    pub status: DeploymentStatus,
    /// Identifier of the deployment
    #[serde(deserialize_with = "lenient")]
    pub deployment_id: String,
    /// Free text from the deployer
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    /// Timing
    #[serde(deserialize_with = "lenient")]
    pub stats: DeploymentStats,
}

/// Start/stop of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentStats {
    /// Start (Unix seconds)
    #[serde(deserialize_with = "lenient_timestamp")]
    pub start_time: Option<f64>,
    /// Stop (Unix seconds)
    #[serde(alias = "end_time", deserialize_with = "lenient_timestamp")]
    pub stop_time: Option<f64>,
}

/// `/simulation/status` -> `simulator`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorRecord {
    /// Simulator status
    #[serde(deserialize_with = "lenient")]
    pub status: SimulatorStatus,
    /// Either rate shape or the generated-image counter; absent fields are zero.
    #[serde(deserialize_with = "lenient")]
    pub stats: SimulatorStats,
}

/// Union of the two simulator stat shapes seen across backend versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorStats {
    /// Emitted bytes per second
    #[serde(deserialize_with = "lenient")]
    pub bytes_per_second: f64,
    /// Emitted images per second
    #[serde(deserialize_with = "lenient")]
    pub images_per_second: f64,
    /// Images generated since start
    #[serde(deserialize_with = "lenient")]
    pub n_generated_images: u64,
}

/// `/daq/stats` -> `stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqStats {
    /// Detector side throughput
    #[serde(deserialize_with = "lenient")]
    pub detector: StreamStats,
    /// Writer side throughput
    #[serde(deserialize_with = "lenient")]
    pub writer: StreamStats,
}

/// Throughput of one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamStats {
    /// Bytes per second
    #[serde(deserialize_with = "lenient")]
    pub bytes_per_second: f64,
    /// Images per second
    #[serde(alias = "writes_per_second", deserialize_with = "lenient")]
    pub images_per_second: f64,
}

/// `/daq/config` -> `config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    /// Detector family (gigafrost, jungfrau, eiger, ...)
    #[serde(deserialize_with = "lenient")]
    pub detector_type: String,
    /// Detector instance name
    #[serde(deserialize_with = "lenient")]
    pub detector_name: String,
    /// Bits per pixel
    #[serde(deserialize_with = "lenient")]
    pub bit_depth: u32,
    /// Assembled image height
    #[serde(deserialize_with = "lenient")]
    pub image_pixel_height: u32,
    /// Assembled image width
    #[serde(deserialize_with = "lenient")]
    pub image_pixel_width: u32,
    /// Number of detector modules
    #[serde(deserialize_with = "lenient")]
    pub n_modules: u32,
    /// First UDP port; module `i` receives on `start_udp_port + i`
    #[serde(deserialize_with = "lenient")]
    pub start_udp_port: u32,
    /// Unix user the writer runs as
    #[serde(deserialize_with = "lenient")]
    pub writer_user_id: u32,
    /// Module id to its rectangle in the assembled image
    #[serde(deserialize_with = "lenient")]
    pub module_positions: BTreeMap<String, ModuleRect>,
}

impl DaqConfig {
    /// Smallest `(width, height)` that contains every module rectangle.
    pub fn module_layout_extent(&self) -> (i64, i64) {
        self.module_positions
            .values()
            .fold((0, 0), |(w, h), rect| (w.max(rect.x1), h.max(rect.y1)))
    }
}

/// Module placement `[x0, y0, x1, y1]` in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct ModuleRect {
    /// Left edge
    pub x0: i64,
    /// Top edge
    pub y0: i64,
    /// Right edge
    pub x1: i64,
    /// Bottom edge
    pub y1: i64,
}

impl ModuleRect {
    /// Width in pixels (0 if the corners are swapped).
    pub fn width(&self) -> i64 {
        (self.x1 - self.x0).max(0)
    }

    /// Height in pixels (0 if the corners are swapped).
    pub fn height(&self) -> i64 {
        (self.y1 - self.y0).max(0)
    }
}

impl From<[i64; 4]> for ModuleRect {
    fn from([x0, y0, x1, y1]: [i64; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<ModuleRect> for [i64; 4] {
    fn from(rect: ModuleRect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

/// `/file/{log_id}` -> `file_metadata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMetadata {
    /// Acquisition log id the file belongs to
    #[serde(deserialize_with = "lenient")]
    pub log_id: String,
    /// Path of the file on the DAQ host
    #[serde(deserialize_with = "lenient")]
    pub filename: String,
    /// Size in bytes
    #[serde(deserialize_with = "lenient")]
    pub file_size: u64,
    /// HDF5 dataset holding the frames
    #[serde(deserialize_with = "lenient")]
    pub dataset_name: String,
    /// Number of frames
    #[serde(deserialize_with = "lenient")]
    pub n_images: u64,
    /// Frame height
    #[serde(alias = "image_height", deserialize_with = "lenient")]
    pub image_pixel_height: u32,
    /// Frame width
    #[serde(alias = "image_width", deserialize_with = "lenient")]
    pub image_pixel_width: u32,
    /// Pixel data type (uint16, ...)
    #[serde(deserialize_with = "lenient")]
    pub dtype: String,
}

/// One row of the acquisition log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionLogEntry {
    /// Key under which the backend stored the run
    pub log_id: String,
    /// The finished acquisition
    pub record: AcquisitionRecord,
}

/// `/daq/logs/{n}` -> `logs`, most recent stop time first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionLog {
    /// Entries, newest first
    pub entries: Vec<AcquisitionLogEntry>,
}

impl AcquisitionLog {
    /// Build a log from unordered entries.
    pub fn from_entries(mut entries: Vec<AcquisitionLogEntry>) -> Self {
        entries.sort_by(|a, b| {
            let a_stop = a.record.stats.stop_time.unwrap_or(f64::NEG_INFINITY);
            let b_stop = b.record.stats.stop_time.unwrap_or(f64::NEG_INFINITY);
            b_stop
                .total_cmp(&a_stop)
                .then_with(|| a.log_id.cmp(&b.log_id))
        });
        Self { entries }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for AcquisitionLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Keyed(BTreeMap<String, Option<AcquisitionRecord>>),
            Listed(Vec<Option<AcquisitionRecord>>),
        }

        let entries = match Option::<Shape>::deserialize(deserializer)? {
            Some(Shape::Keyed(map)) => map
                .into_iter()
                .map(|(log_id, record)| AcquisitionLogEntry {
                    log_id,
                    record: record.unwrap_or_default(),
                })
                .collect(),
            Some(Shape::Listed(list)) => list
                .into_iter()
                .enumerate()
                .map(|(index, record)| AcquisitionLogEntry {
                    log_id: index.to_string(),
                    record: record.unwrap_or_default(),
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(AcquisitionLog::from_entries(entries))
    }
}

/// Body of `POST /writer/write_async`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Number of images to write
    pub n_images: u64,
    /// Absolute output path
    pub output_file: String,
    /// Run identifier; the backend uses the request time when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writer_status_fills_missing_fields() {
        let status: WriterStatus = serde_json::from_value(json!({
            "state": "WRITING",
            "acquisition": {
                "state": "ACQUIRING_IMAGES",
                "info": {"n_images": 100, "output_file": null},
                "stats": {"n_write_completed": 10, "start_time": 1684930336.12}
            }
        }))
        .unwrap();

        assert_eq!(status.state, WriterState::Writing);
        assert_eq!(status.acquisition.state, AcquisitionState::AcquiringImages);
        assert_eq!(status.acquisition.info.output_file, "");
        assert_eq!(status.acquisition.stats.n_write_requested, 0);
        assert_eq!(status.acquisition.stats.n_write_completed, 10);
        assert_eq!(status.acquisition.stats.start_time, Some(1684930336.12));
        assert_eq!(status.acquisition.stats.stop_time, None);
        assert!(status.acquisition.reports.is_empty());
    }

    #[test]
    fn null_objects_become_defaults() {
        let status: WriterStatus =
            serde_json::from_value(json!({"state": null, "acquisition": null})).unwrap();
        assert_eq!(status, WriterStatus::default());
    }

    #[test]
    fn mistyped_leaf_defaults_only_that_field() {
        let status: WriterStatus = serde_json::from_value(json!({
            "state": "WRITING",
            "acquisition": {
                "info": {"n_images": 100, "output_file": "/data/1.h5"},
                "stats": {"n_write_requested": 100, "n_write_completed": 25.0}
            }
        }))
        .unwrap();
        assert_eq!(status.state, WriterState::Writing);
        assert_eq!(status.acquisition.info.n_images, 100);
        assert_eq!(status.acquisition.stats.n_write_requested, 100);
        assert_eq!(status.acquisition.stats.n_write_completed, 0);

        let config: DaqConfig = serde_json::from_value(json!({
            "detector_name": "JF07T32V01",
            "bit_depth": "16",
            "n_modules": 2
        }))
        .unwrap();
        assert_eq!(config.detector_name, "JF07T32V01");
        assert_eq!(config.bit_depth, 0);
        assert_eq!(config.n_modules, 2);

        let simulator: SimulatorRecord = serde_json::from_value(json!({
            "status": "STREAMING",
            "stats": {"n_generated_images": -1, "images_per_second": 5.0}
        }))
        .unwrap();
        assert_eq!(simulator.stats.n_generated_images, 0);
        assert_eq!(simulator.stats.images_per_second, 5.0);
    }

    #[test]
    fn simulator_accepts_both_stat_shapes() {
        let rates: SimulatorRecord = serde_json::from_value(json!({
            "status": "STREAMING",
            "stats": {"bytes_per_second": 2097152.0, "images_per_second": 10}
        }))
        .unwrap();
        assert_eq!(rates.status, SimulatorStatus::Streaming);
        assert_eq!(rates.stats.images_per_second, 10.0);
        assert_eq!(rates.stats.n_generated_images, 0);

        let counter: SimulatorRecord = serde_json::from_value(json!({
            "status": "READY",
            "stats": {"n_generated_images": 1234}
        }))
        .unwrap();
        assert_eq!(counter.stats.n_generated_images, 1234);
        assert_eq!(counter.stats.bytes_per_second, 0.0);
    }

    #[test]
    fn deployment_accepts_end_time_alias() {
        let record: DeploymentRecord = serde_json::from_value(json!({
            "status": "SUCCESS",
            "deployment_id": "d-1",
            "stats": {"start_time": 10, "end_time": 15}
        }))
        .unwrap();
        assert_eq!(record.stats.stop_time, Some(15.0));
        assert_eq!(record.message, "");
    }

    #[test]
    fn daq_config_module_positions() {
        let config: DaqConfig = serde_json::from_value(json!({
            "detector_name": "GF2",
            "bit_depth": 16,
            "module_positions": {"0": [0, 0, 1007, 503], "1": [1008, 0, 2015, 503]}
        }))
        .unwrap();
        assert_eq!(config.module_positions.len(), 2);
        assert_eq!(config.module_positions["1"].width(), 1007);
        assert_eq!(config.module_layout_extent(), (2015, 503));
        assert_eq!(config.n_modules, 0);

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["module_positions"]["0"], json!([0, 0, 1007, 503]));
    }

    #[test]
    fn acquisition_log_from_mapping_is_newest_first() {
        let log: AcquisitionLog = serde_json::from_value(json!({
            "a": {"message": "Completed.", "stats": {"stop_time": 100.0}},
            "b": {"message": "Interrupted.", "stats": {"stop_time": 300.0}},
            "c": {"message": "Completed.", "stats": {"stop_time": 200.0}}
        }))
        .unwrap();
        let ids: Vec<_> = log.entries.iter().map(|e| e.log_id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn acquisition_log_from_list_and_null() {
        let log: AcquisitionLog = serde_json::from_value(json!([
            {"info": {"n_images": 5}, "stats": {"stop_time": 1.0}},
            null
        ]))
        .unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries[0].log_id, "0");

        let empty: AcquisitionLog = serde_json::from_value(serde_json::Value::Null).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn file_metadata_accepts_short_dimension_keys() {
        let meta: FileMetadata = serde_json::from_value(json!({
            "n_images": 10, "image_height": 2016, "image_width": 2016, "dtype": "uint16"
        }))
        .unwrap();
        assert_eq!(meta.image_pixel_height, 2016);
        assert_eq!(meta.image_pixel_width, 2016);
        assert_eq!(meta.file_size, 0);
    }

    #[test]
    fn write_request_omits_missing_run_id() {
        let body = serde_json::to_value(WriteRequest {
            n_images: 10,
            output_file: "/tmp/run.h5".into(),
            run_id: None,
        })
        .unwrap();
        assert_eq!(body, json!({"n_images": 10, "output_file": "/tmp/run.h5"}));
    }
}
