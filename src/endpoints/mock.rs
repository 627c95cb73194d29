//! Scripted in-memory backend.
//!
//! Stands in for the DAQ REST service in tests and demos. Replies are scripted per path
//! and every call is counted. A path can also be held (gated) or slowed down to exercise
//! in-flight behavior.
//!
//! # Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use daq_dashboard::endpoints::{Endpoints, MockReply, MockTransport, ResourceRequest};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mock = Arc::new(MockTransport::new());
//! mock.set("/daq/deployment", MockReply::ok("deployment", json!({"status": "SUCCESS"})));
//! mock.push(MockReply::transport_error("connection refused"), "/daq/deployment");
//!
//! let endpoints = Endpoints::new(mock.clone());
//! assert!(endpoints.fetch(&ResourceRequest::Deployment).await.is_err());
//! assert!(endpoints.fetch(&ResourceRequest::Deployment).await.is_ok());
//! assert_eq!(mock.calls("/daq/deployment"), 2);
//! # });
//! ```

use super::{BinaryBody, EndpointError, ProgressFn, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Chunks a scripted binary body is delivered in.
const MOCK_CHUNKS: usize = 4;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A JSON document (envelope or not)
    Json(Value),
    /// A binary body; `known_length` controls whether progress reports a total
    Binary {
        /// Body to deliver
        body: BinaryBody,
        /// Report `Some(total)` to the progress callback
        known_length: bool,
    },
    /// The call fails before producing a response
    Fail(EndpointError),
}

impl MockReply {
    /// Successful envelope with `payload` under `key`.
    pub fn ok(key: &str, payload: Value) -> Self {
        let mut envelope = serde_json::Map::new();
        envelope.insert("status".into(), Value::from("ok"));
        envelope.insert(key.into(), payload);
        MockReply::Json(Value::Object(envelope))
    }

    /// `status: "error"` envelope.
    pub fn backend_error(message: &str) -> Self {
        MockReply::Json(serde_json::json!({"status": "error", "message": message}))
    }

    /// No response at all.
    pub fn transport_error(message: &str) -> Self {
        MockReply::Fail(EndpointError::Transport(message.to_string()))
    }

    /// Binary body with a known length.
    pub fn binary(bytes: impl Into<Bytes>, content_type: &str) -> Self {
        MockReply::Binary {
            body: BinaryBody {
                bytes: bytes.into(),
                content_type: Some(content_type.to_string()),
            },
            known_length: true,
        }
    }
}

#[derive(Default)]
struct Route {
    queue: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    calls: usize,
    in_flight: usize,
    max_in_flight: usize,
    gate: Option<Arc<Semaphore>>,
    latency: Option<Duration>,
}

/// In-memory [`Transport`].
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    posted: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    /// Empty script; unscripted paths fail with a transport error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call on `path` with `reply` once the one-shot queue is drained.
    pub fn set(&self, path: &str, reply: MockReply) {
        self.routes.lock().entry(path.to_string()).or_default().fallback = Some(reply);
    }

    /// Shorthand for [`set`](Self::set) with a JSON document.
    pub fn set_json(&self, path: &str, value: Value) {
        self.set(path, MockReply::Json(value));
    }

    /// Queue a one-shot reply for `path`; queued replies are used before the fallback.
    pub fn push(&self, reply: MockReply, path: &str) {
        self.routes
            .lock()
            .entry(path.to_string())
            .or_default()
            .queue
            .push_back(reply);
    }

    /// Delay every reply on `path`.
    pub fn set_latency(&self, path: &str, latency: Duration) {
        self.routes.lock().entry(path.to_string()).or_default().latency = Some(latency);
    }

    /// Hold calls on `path` until [`release`](Self::release) lets them through.
    pub fn hold(&self, path: &str) {
        self.routes.lock().entry(path.to_string()).or_default().gate =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held calls on `path` proceed.
    pub fn release(&self, path: &str, n: usize) {
        if let Some(gate) = self
            .routes
            .lock()
            .get(path)
            .and_then(|route| route.gate.clone())
        {
            gate.add_permits(n);
        }
    }

    /// Number of calls made on `path` so far (including ones still held).
    pub fn calls(&self, path: &str) -> usize {
        self.routes.lock().get(path).map_or(0, |route| route.calls)
    }

    /// Calls on `path` currently waiting for their reply.
    pub fn in_flight(&self, path: &str) -> usize {
        self.routes.lock().get(path).map_or(0, |route| route.in_flight)
    }

    /// Highest number of simultaneous calls ever observed on `path`.
    pub fn max_in_flight(&self, path: &str) -> usize {
        self.routes.lock().get(path).map_or(0, |route| route.max_in_flight)
    }

    /// Bodies posted so far, in order.
    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().clone()
    }

    async fn respond(&self, path: &str) -> MockReply {
        let (gate, latency) = {
            let mut routes = self.routes.lock();
            let route = routes.entry(path.to_string()).or_default();
            route.calls += 1;
            route.in_flight += 1;
            route.max_in_flight = route.max_in_flight.max(route.in_flight);
            (route.gate.clone(), route.latency)
        };
        let _in_flight = InFlight { mock: self, path };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut routes = self.routes.lock();
        let route = routes.entry(path.to_string()).or_default();
        route
            .queue
            .pop_front()
            .or_else(|| route.fallback.clone())
            .unwrap_or_else(|| {
                MockReply::Fail(EndpointError::Transport(format!(
                    "no mock reply scripted for {}",
                    path
                )))
            })
    }
}

/// Decrements the in-flight count even when the calling future is dropped mid-wait.
struct InFlight<'a> {
    mock: &'a MockTransport,
    path: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(route) = self.mock.routes.lock().get_mut(self.path) {
            route.in_flight = route.in_flight.saturating_sub(1);
        }
    }
}

fn expect_json(reply: MockReply, path: &str) -> Result<Value, EndpointError> {
    match reply {
        MockReply::Json(value) => Ok(value),
        MockReply::Fail(err) => Err(err),
        MockReply::Binary { .. } => Err(EndpointError::Malformed(format!(
            "{} answered with a binary body",
            path
        ))),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(&self, path: &str) -> Result<Value, EndpointError> {
        let reply = self.respond(path).await;
        expect_json(reply, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, EndpointError> {
        self.posted.lock().push((path.to_string(), body));
        let reply = self.respond(path).await;
        expect_json(reply, path)
    }

    async fn get_binary(
        &self,
        path: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<BinaryBody, EndpointError> {
        match self.respond(path).await {
            MockReply::Binary { body, known_length } => {
                let len = body.bytes.len();
                let total = known_length.then_some(len as u64);
                let chunk = len.div_ceil(MOCK_CHUNKS).max(1);
                progress(0, total);
                let mut loaded = 0;
                while loaded < len {
                    loaded = (loaded + chunk).min(len);
                    progress(loaded as u64, total);
                    tokio::task::yield_now().await;
                }
                Ok(body)
            }
            MockReply::Json(value) => Err(match super::open_envelope(value, "") {
                Err(err) => err,
                Ok(_) => EndpointError::Malformed(format!("{} answered with JSON", path)),
            }),
            MockReply::Fail(err) => Err(err),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("mock://daq{}", path)
    }
}
