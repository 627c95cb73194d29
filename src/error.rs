//! Custom error types for the dashboard core.
//!
//! This module defines the primary error type, `DashboardError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur outside of the per-resource polling path.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   in the configuration file or environment overrides.
//! - **`Configuration`**: Semantic errors in the configuration that pass parsing but are
//!   logically incorrect (e.g. a base URL without an http scheme).
//! - **`Endpoint`**: An adapter result that was not `ok`. Inside the poll loop these never
//!   surface as `DashboardError`; they are stored per resource by the reconciler. They only
//!   reach callers through one-shot commands (start writer, set config, ...).
//! - **`InvalidWriteRequest`**: A write request rejected locally before it was sent.
//! - **`PayloadMismatch`**: A payload was handed to the reconciler under the wrong resource.
//! - **`AssetCancelled`**: A binary asset fetch was superseded or its dialog closed.
//! - **`Task`**: A background task ended without producing its result (panicked).
//!
//! Transport failures and backend `status: "error"` envelopes are modelled by
//! [`EndpointError`](crate::endpoints::EndpointError) so they can be stored as plain
//! messages next to the last good record.

use crate::endpoints::EndpointError;
use crate::reconciler::ResourceId;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DashboardError>;

/// Failures outside the per-resource polling path.
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Configuration file or environment could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Local file access, e.g. saving a downloaded asset
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure or backend error envelope from a one-shot command
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Write request rejected before it was sent
    #[error("Invalid write request: {0}")]
    InvalidWriteRequest(String),

    /// Payload handed to the wrong reconciler slot
    #[error("Payload for {found} cannot be applied to {expected}")]
    PayloadMismatch {
        /// Slot the payload was delivered to
        expected: ResourceId,
        /// Resource the payload actually describes
        found: ResourceId,
    },

    /// Asset fetch superseded or its dialog closed
    #[error("Asset fetch was cancelled")]
    AssetCancelled,

    /// Background task ended without a result
    #[error("Background task failed: {0}")]
    Task(String),
}

impl DashboardError {
    /// Whether the next poll tick or a user retry can be expected to succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DashboardError::Endpoint(_) | DashboardError::AssetCancelled => true,
            DashboardError::Config(_)
            | DashboardError::Configuration(_)
            | DashboardError::Io(_)
            | DashboardError::InvalidWriteRequest(_)
            | DashboardError::PayloadMismatch { .. }
            | DashboardError::Task(_) => false,
        }
    }
}
