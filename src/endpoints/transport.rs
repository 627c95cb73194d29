//! HTTP transport seam.

use super::EndpointError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

/// Download progress callback: `(bytes_loaded, bytes_total_if_known)`.
pub type ProgressFn<'a> = dyn Fn(u64, Option<u64>) + Send + Sync + 'a;

/// A fully received binary body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBody {
    /// Raw bytes
    pub bytes: Bytes,
    /// `Content-Type` reported by the backend
    pub content_type: Option<String>,
}

/// How the adapters reach the backend.
///
/// `get_json`/`post_json` return any JSON body the backend produced, including bodies of
/// non-2xx responses, so envelope normalization sees backend error messages. Only a
/// missing or non-JSON response is a transport error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a JSON document.
    async fn get_json(&self, path: &str) -> Result<Value, EndpointError>;

    /// POST a JSON body and read a JSON document back.
    async fn post_json(&self, path: &str, body: Value) -> Result<Value, EndpointError>;

    /// GET a binary body, invoking `progress` after every received chunk.
    async fn get_binary(
        &self,
        path: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<BinaryBody, EndpointError>;

    /// Absolute URL for `path`, for resources displayed directly (the live stream).
    fn url(&self, path: &str) -> String;
}

/// `reqwest` backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Transport for the backend at `base_url` (trailing slashes are ignored).
    ///
    /// No request timeout is set: a hung request only keeps its resource in flight.
    pub fn new(base_url: &str) -> Result<Self, EndpointError> {
        let client = Client::builder()
            .build()
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json(response: Response) -> Result<Value, EndpointError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => {
                if !status.is_success() {
                    debug!(%status, "Backend answered with a JSON error body");
                }
                Ok(value)
            }
            Err(e) if status.is_success() => {
                Err(EndpointError::Malformed(format!("invalid JSON body: {}", e)))
            }
            Err(_) => Err(EndpointError::Transport(http_failure(status))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<Value, EndpointError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, EndpointError> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn get_binary(
        &self,
        path: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<BinaryBody, EndpointError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Error pages for binary routes are still JSON envelopes when the backend
            // produced them.
            return Err(match Self::read_json(response).await {
                Ok(body) => match super::open_envelope(body, "") {
                    Err(err) => err,
                    Ok(_) => EndpointError::Transport(http_failure(status)),
                },
                Err(err) => err,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let total = response.content_length();

        let mut buffer = BytesMut::new();
        let mut stream = response.bytes_stream();
        progress(0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                warn!(path, error = %e, "Binary download interrupted");
                EndpointError::Transport(e.to_string())
            })?;
            buffer.extend_from_slice(&chunk);
            progress(buffer.len() as u64, total);
        }

        Ok(BinaryBody {
            bytes: buffer.freeze(),
            content_type,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn http_failure(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let transport = HttpTransport::new("http://daq:5000/").unwrap();
        assert_eq!(transport.base_url(), "http://daq:5000");
        assert_eq!(transport.url("/writer/status"), "http://daq:5000/writer/status");
    }

    #[test]
    fn http_failure_names_status() {
        assert_eq!(http_failure(StatusCode::BAD_GATEWAY), "HTTP 502 Bad Gateway");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let err = transport.get_json("/writer/status").await.unwrap_err();
        assert!(matches!(err, EndpointError::Transport(_)));
    }
}
