//! Tracing initialization
//!
//! Every poll, command and download emits structured `tracing` events carrying the
//! resource they concern (`resource = %id`). This module installs the subscriber that
//! renders them in one of three formats:
//! - `pretty`: multi-line with colors, for a terminal
//! - `compact`: one line per event, no colors
//! - `json`: one object per line, for log shipping
//!
//! `RUST_LOG` takes precedence over the configured level. Without it the HTTP stack
//! is held at `warn` so that twelve requests per second do not drown the dashboard's
//! own events.
//!
//! # Example
//! ```no_run
//! use daq_dashboard::{config::DashboardConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DashboardConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Dashboard started");
//! # Ok(())
//! # }
//! ```

use crate::config::DashboardConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Crates whose events are capped at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored
    Pretty,
    /// Single line, uncolored
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format '{}'. Must be one of: pretty, compact, json",
                s
            )),
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Maximum level of the dashboard's own events
    pub level: Level,
    /// Rendering
    pub format: LogFormat,
    /// Show source file and line
    pub with_file_and_line: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            with_file_and_line: false,
        }
    }
}

impl LogSettings {
    /// Settings from the `[logging]` section.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, String> {
        let level = Level::from_str(&config.logging.level).map_err(|_| {
            format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                config.logging.level
            )
        })?;
        Ok(Self {
            level,
            format: config.logging.format.parse()?,
            ..Default::default()
        })
    }

    /// Filter directives used when `RUST_LOG` is unset.
    pub fn default_directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        let quiet = QUIET_TARGETS
            .iter()
            .map(|target| format!("{}=warn", target));
        std::iter::once(level)
            .chain(quiet)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directives()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_file(self.with_file_and_line)
            .with_line_number(self.with_file_and_line);
        match self.format {
            LogFormat::Pretty => base.pretty().with_filter(self.filter()).boxed(),
            LogFormat::Compact => base
                .compact()
                .with_ansi(false)
                .with_filter(self.filter())
                .boxed(),
            LogFormat::Json => base.json().with_filter(self.filter()).boxed(),
        }
    }
}

/// Install the global subscriber described by the `[logging]` section.
pub fn init_from_config(config: &DashboardConfig) -> Result<(), String> {
    init(&LogSettings::from_config(config)?)
}

/// Install the global subscriber.
///
/// Returns `Ok(())` if a subscriber is already installed (tests, embedding
/// applications).
pub fn init(settings: &LogSettings) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    tracing_subscriber::registry()
        .with(settings.layer())
        .try_init()
        .map_err(|e| format!("Failed to initialize tracing: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_case_insensitive() {
        assert_eq!("JSON".parse(), Ok(LogFormat::Json));
        assert_eq!("compact".parse(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = DashboardConfig::default();
        config.logging.level = "DEBUG".to_string();
        config.logging.format = "json".to_string();

        let settings = LogSettings::from_config(&config).unwrap();
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Json);
    }

    #[test]
    fn invalid_level_is_rejected() {
        let mut config = DashboardConfig::default();
        config.logging.level = "verbose".to_string();
        let err = LogSettings::from_config(&config).unwrap_err();
        assert!(err.contains("verbose"));
    }

    #[test]
    fn http_stack_is_quiet_by_default() {
        let settings = LogSettings {
            level: Level::TRACE,
            ..Default::default()
        };
        assert_eq!(
            settings.default_directives(),
            "trace,hyper=warn,hyper_util=warn,reqwest=warn"
        );
    }
}
