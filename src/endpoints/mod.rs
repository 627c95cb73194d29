//! Endpoint adapters
//!
//! One adapter per backend resource. Each adapter knows its path, its request shape and
//! the key its payload is stored under, and normalizes the backend envelope
//! `{ status: "ok" | "error", message?, <payload key>: ... }` into
//! `Result<Payload, EndpointError>`. Nothing escapes the adapter boundary as a panic;
//! transport failures, backend errors and undecodable bodies all become an
//! [`EndpointError`] that the reconciler stores next to the last good record.
//!
//! The HTTP plumbing lives behind the [`Transport`] trait so the adapters can run
//! against [`MockTransport`] in tests.

mod mock;
mod transport;

pub use mock::{MockReply, MockTransport};
pub use transport::{BinaryBody, HttpTransport, ProgressFn, Transport};

use crate::models::{
    AcquisitionLog, DaqConfig, DaqStats, DeploymentRecord, FileMetadata, SimulatorRecord,
    WriteRequest, WriterStatus,
};
use crate::reconciler::ResourceId;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why an adapter call did not produce a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// No usable response (connection refused, DNS, non-JSON error page, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// `status: "error"`; the backend message is shown verbatim.
    #[error("{0}")]
    Backend(String),

    /// A response arrived but it is not an envelope this dashboard understands.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// A polled or on-demand JSON resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    /// `GET /writer/status`
    WriterStatus,
    /// `GET /daq/config`
    DaqConfig,
    /// `GET /daq/stats`
    DaqStats,
    /// `GET /daq/deployment`
    Deployment,
    /// `GET /simulation/status`
    Simulator,
    /// `GET /daq/logs/{n}`
    AcquisitionLog {
        /// Number of most recent entries
        n: u32,
    },
    /// `GET /file/{log_id}`
    FileMetadata {
        /// Acquisition log id
        log_id: String,
    },
}

impl ResourceRequest {
    /// Request path relative to the backend base URL.
    pub fn path(&self) -> String {
        match self {
            ResourceRequest::WriterStatus => "/writer/status".to_string(),
            ResourceRequest::DaqConfig => "/daq/config".to_string(),
            ResourceRequest::DaqStats => "/daq/stats".to_string(),
            ResourceRequest::Deployment => "/daq/deployment".to_string(),
            ResourceRequest::Simulator => "/simulation/status".to_string(),
            ResourceRequest::AcquisitionLog { n } => format!("/daq/logs/{}", n),
            ResourceRequest::FileMetadata { log_id } => format!("/file/{}", log_id),
        }
    }

    /// The reconciler slot this request feeds.
    pub fn resource_id(&self) -> ResourceId {
        match self {
            ResourceRequest::WriterStatus => ResourceId::WriterStatus,
            ResourceRequest::DaqConfig => ResourceId::DaqConfig,
            ResourceRequest::DaqStats => ResourceId::DaqStats,
            ResourceRequest::Deployment => ResourceId::Deployment,
            ResourceRequest::Simulator => ResourceId::Simulator,
            ResourceRequest::AcquisitionLog { .. } => ResourceId::AcquisitionLog,
            ResourceRequest::FileMetadata { .. } => ResourceId::FileMetadata,
        }
    }
}

/// A decoded, defaulted payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `/writer/status`
    WriterStatus(WriterStatus),
    /// `/daq/config`
    DaqConfig(DaqConfig),
    /// `/daq/stats`
    DaqStats(DaqStats),
    /// `/daq/deployment`
    Deployment(DeploymentRecord),
    /// `/simulation/status` and the simulator commands
    Simulator(SimulatorRecord),
    /// `/daq/logs/{n}`
    AcquisitionLog(AcquisitionLog),
    /// `/file/{log_id}`
    FileMetadata(FileMetadata),
}

impl Payload {
    /// The reconciler slot this payload belongs to.
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Payload::WriterStatus(_) => ResourceId::WriterStatus,
            Payload::DaqConfig(_) => ResourceId::DaqConfig,
            Payload::DaqStats(_) => ResourceId::DaqStats,
            Payload::Deployment(_) => ResourceId::Deployment,
            Payload::Simulator(_) => ResourceId::Simulator,
            Payload::AcquisitionLog(_) => ResourceId::AcquisitionLog,
            Payload::FileMetadata(_) => ResourceId::FileMetadata,
        }
    }
}

/// A binary frame to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    /// Acquisition log id of the file
    pub log_id: String,
    /// Frame index inside the file
    pub i_image: u64,
    /// Request the module-map overlay instead of the raw frame
    pub module_map: bool,
}

impl FrameRequest {
    /// Raw frame.
    pub fn frame(log_id: impl Into<String>, i_image: u64) -> Self {
        Self {
            log_id: log_id.into(),
            i_image,
            module_map: false,
        }
    }

    /// Module-map overlay of a frame.
    pub fn module_map(log_id: impl Into<String>, i_image: u64) -> Self {
        Self {
            log_id: log_id.into(),
            i_image,
            module_map: true,
        }
    }

    /// Request path relative to the backend base URL.
    pub fn path(&self) -> String {
        if self.module_map {
            format!("/file/{}/{}?module_map=1", self.log_id, self.i_image)
        } else {
            format!("/file/{}/{}", self.log_id, self.i_image)
        }
    }
}

/// Path of the MJPEG live stream.
pub const LIVE_STREAM_PATH: &str = "/daq/live";

/// The adapters, bound to one transport.
#[derive(Clone)]
pub struct Endpoints {
    transport: Arc<dyn Transport>,
}

impl Endpoints {
    /// Bind the adapters to a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Adapters talking HTTP to `base_url`.
    pub fn http(base_url: &str) -> Result<Self, EndpointError> {
        Ok(Self::new(Arc::new(HttpTransport::new(base_url)?)))
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Absolute URL of the live stream.
    pub fn live_stream_url(&self) -> String {
        self.transport.url(LIVE_STREAM_PATH)
    }

    /// Fetch and normalize one JSON resource.
    pub async fn fetch(&self, request: &ResourceRequest) -> Result<Payload, EndpointError> {
        let path = request.path();
        debug!(path = %path, "Fetching resource");
        let body = self.transport.get_json(&path).await?;
        decode_resource(request, body)
    }

    /// `POST /writer/write_async`
    pub async fn start_writer(&self, request: &WriteRequest) -> Result<WriterStatus, EndpointError> {
        let body = serde_json::to_value(request)
            .map_err(|e| EndpointError::Malformed(format!("write request: {}", e)))?;
        let reply = self
            .transport
            .post_json("/writer/write_async", body)
            .await?;
        decode_writer(reply)
    }

    /// `POST /writer/stop`
    pub async fn stop_writer(&self) -> Result<WriterStatus, EndpointError> {
        let reply = self
            .transport
            .post_json("/writer/stop", Value::Object(Default::default()))
            .await?;
        decode_writer(reply)
    }

    /// `POST /daq/config`
    pub async fn set_daq_config(&self, config: &DaqConfig) -> Result<DaqConfig, EndpointError> {
        let body = serde_json::to_value(config)
            .map_err(|e| EndpointError::Malformed(format!("daq config: {}", e)))?;
        let reply = self.transport.post_json("/daq/config", body).await?;
        decode(open_envelope(reply, "config")?)
    }

    /// `POST /simulation/start`
    pub async fn start_simulator(&self) -> Result<SimulatorRecord, EndpointError> {
        self.simulator_command("/simulation/start").await
    }

    /// `POST /simulation/stop`
    pub async fn stop_simulator(&self) -> Result<SimulatorRecord, EndpointError> {
        self.simulator_command("/simulation/stop").await
    }

    async fn simulator_command(&self, path: &str) -> Result<SimulatorRecord, EndpointError> {
        let reply = self
            .transport
            .post_json(path, Value::Object(Default::default()))
            .await?;
        decode(open_envelope(reply, "simulator")?)
    }

    /// Binary GET of a frame or module map, reporting `(loaded, total)` as bytes arrive.
    pub async fn fetch_frame(
        &self,
        request: &FrameRequest,
        progress: &ProgressFn<'_>,
    ) -> Result<BinaryBody, EndpointError> {
        let path = request.path();
        debug!(path = %path, "Fetching binary asset");
        self.transport.get_binary(&path, progress).await
    }
}

/// Normalize an envelope and decode the payload for `request`.
pub fn decode_resource(request: &ResourceRequest, body: Value) -> Result<Payload, EndpointError> {
    Ok(match request {
        ResourceRequest::WriterStatus => Payload::WriterStatus(decode_writer(body)?),
        ResourceRequest::DaqConfig => Payload::DaqConfig(decode(open_envelope(body, "config")?)?),
        ResourceRequest::DaqStats => Payload::DaqStats(decode(open_envelope(body, "stats")?)?),
        ResourceRequest::Deployment => {
            Payload::Deployment(decode(open_envelope(body, "deployment")?)?)
        }
        ResourceRequest::Simulator => {
            Payload::Simulator(decode(open_envelope(body, "simulator")?)?)
        }
        ResourceRequest::AcquisitionLog { .. } => {
            Payload::AcquisitionLog(decode(open_envelope(body, "logs")?)?)
        }
        ResourceRequest::FileMetadata { .. } => {
            Payload::FileMetadata(decode(open_envelope(body, "file_metadata")?)?)
        }
    })
}

/// Check the envelope status and take the payload stored under `key`.
///
/// A successful envelope without the key yields `Value::Null`, which decodes to the
/// record's defaults.
pub fn open_envelope(body: Value, key: &str) -> Result<Value, EndpointError> {
    let Value::Object(mut envelope) = body else {
        return Err(EndpointError::Malformed(
            "response is not a JSON object".to_string(),
        ));
    };

    match envelope.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(envelope.remove(key).unwrap_or(Value::Null)),
        Some("error") => {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Backend reported an error without a message");
            Err(EndpointError::Backend(message.to_string()))
        }
        Some(other) => Err(EndpointError::Malformed(format!(
            "unexpected envelope status '{}'",
            other
        ))),
        None => Err(EndpointError::Malformed(
            "envelope has no status".to_string(),
        )),
    }
}

/// The writer payload is stored under `writer`; older backends returned the bare
/// acquisition under `acquisition`.
fn decode_writer(body: Value) -> Result<WriterStatus, EndpointError> {
    let mut payload = open_envelope(body.clone(), "writer")?;
    if payload.is_null() {
        if let Value::Object(mut envelope) = body {
            if let Some(acquisition) = envelope.remove("acquisition") {
                payload = serde_json::json!({ "acquisition": acquisition });
            }
        }
    }
    decode(payload)
}

fn decode<T>(payload: Value) -> Result<T, EndpointError>
where
    T: DeserializeOwned + Default,
{
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|e| EndpointError::Malformed(e.to_string()))
}
