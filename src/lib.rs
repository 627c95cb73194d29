//! # DAQ Dashboard Core Library
//!
//! This crate is the status synchronization core of the detector DAQ operator dashboard.
//! It polls the DAQ REST backend, reconciles the heterogeneous JSON payloads into a
//! per-subsystem view model, classifies backend state strings into display badges,
//! derives progress/elapsed/throughput metrics, and downloads binary frames with progress
//! reporting and safe release. The `daq-dashboard` binary (`main.rs`) is a thin CLI over
//! this library.
//!
//! ## Crate Structure
//!
//! - **`poller`**: Periodic fetch sessions with a per-resource in-flight guard and clean
//!   teardown.
//! - **`endpoints`**: One adapter per backend resource; normalizes the `status: ok|error`
//!   envelope into `Result<Payload, EndpointError>`. Includes the `Transport` seam, the
//!   `reqwest` transport and a scripted `MockTransport`.
//! - **`reconciler`**: Latest record plus independent error per resource.
//! - **`classifier`**: Backend state enums and their `{label, severity}` badges.
//! - **`metrics`**: Total functions for progress, elapsed time, bandwidth and frequency.
//! - **`assets`**: Binary asset downloads, `blob:` handles and the owning dialog.
//! - **`models`**: Lenient typed records for every payload.
//! - **`views`**: Panel views derived from a view-model snapshot.
//! - **`dashboard`**: One operator session: poll sessions, commands and session context.
//! - **`config`**: Figment-based configuration (`config/dashboard.toml` + `DAQ_DASHBOARD_*`).
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`error`**: The crate-wide `DashboardError`.
//! - **`validation`**: Write request checks.

pub mod assets;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod endpoints;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod reconciler;
pub mod validation;
pub mod views;

pub use dashboard::{Dashboard, DashboardContext};
pub use error::{AppResult, DashboardError};
