//! Dashboard configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/dashboard.toml` (base configuration)
//! 2. Environment variables (prefixed with `DAQ_DASHBOARD_`, nested keys split on `__`)
//!
//! The poll cadence is deliberately absent: every periodic resource is refreshed at
//! [`POLL_INTERVAL`](crate::poller::POLL_INTERVAL).
//!
//! # Example
//! ```no_run
//! use daq_dashboard::config::DashboardConfig;
//!
//! let config = DashboardConfig::load()?;
//! println!("Backend: {}", config.backend.base_url);
//! # Ok::<(), figment::Error>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";

/// Top-level dashboard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Backend REST service
    #[serde(default)]
    pub backend: BackendConfig,
    /// Panel defaults
    #[serde(default)]
    pub dashboard: PanelConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the DAQ REST service lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://127.0.0.1:5000`
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Defaults used by the individual panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Number of entries requested from `/daq/logs/{n}`
    #[serde(default = "default_log_entries")]
    pub acquisition_log_entries: u32,
    /// Output folder pre-filled in the writer control
    #[serde(default = "default_output_folder")]
    pub default_output_folder: String,
    /// Image count pre-filled in the writer control
    #[serde(default = "default_n_images")]
    pub default_n_images: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_log_entries() -> u32 {
    5
}

fn default_output_folder() -> String {
    "/tmp/".to_string()
}

fn default_n_images() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            acquisition_log_entries: default_log_entries(),
            default_output_folder: default_output_folder(),
            default_n_images: default_n_images(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl DashboardConfig {
    /// Load configuration from `config/dashboard.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `DAQ_DASHBOARD_`.
    /// Example: `DAQ_DASHBOARD_BACKEND__BASE_URL=http://daq:5000`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file is not an error;
    /// every key has a default.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(DashboardConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DAQ_DASHBOARD_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        let url = self.backend.base_url.trim();
        if url.is_empty() {
            return Err("Backend base_url cannot be empty".to_string());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!(
                "Invalid backend base_url '{}'. Must start with http:// or https://",
                url
            ));
        }

        if self.dashboard.acquisition_log_entries == 0 {
            return Err("acquisition_log_entries must be at least 1".to_string());
        }

        Ok(())
    }
}
