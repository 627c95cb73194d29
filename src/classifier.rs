//! Status classification
//!
//! Maps backend state strings onto a closed set of display badges. Each subsystem has
//! its own tagged union with an `Unknown` arm, so a value the dashboard has never heard
//! of (version skew between dashboard and backend) still classifies deterministically
//! as `Unknown`/`error` instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display severity of a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Healthy/idle-ready state
    Success,
    /// Work in progress
    Info,
    /// Needs attention but not failed
    Warning,
    /// Failed or unrecognized
    Error,
}

impl Severity {
    /// Lowercase name, as used by the presentation layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label and severity shown for a subsystem state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    /// Human readable label
    pub label: &'static str,
    /// Badge color class
    pub severity: Severity,
}

impl StatusBadge {
    /// Fallback for any state outside a subsystem's table.
    pub const UNKNOWN: StatusBadge = StatusBadge::new("Unknown", Severity::Error);

    const fn new(label: &'static str, severity: Severity) -> Self {
        Self { label, severity }
    }
}

/// Which subsystem a raw state string belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    /// `/writer/status` -> `state`
    Writer,
    /// `/writer/status` -> `acquisition.state`
    Acquisition,
    /// `/daq/deployment` -> `status`
    Deployment,
    /// `/simulation/status` -> `status`
    Simulator,
}

/// Anything that can be rendered as a badge.
pub trait Classify {
    /// Badge for the current value.
    fn badge(&self) -> StatusBadge;
}

/// Classify a raw backend state for the given subsystem. Never fails.
pub fn classify(kind: SubsystemKind, raw_state: &str) -> StatusBadge {
    match kind {
        SubsystemKind::Writer => WriterState::from(raw_state).badge(),
        SubsystemKind::Acquisition => AcquisitionState::from(raw_state).badge(),
        SubsystemKind::Deployment => DeploymentStatus::from(raw_state).badge(),
        SubsystemKind::Simulator => SimulatorStatus::from(raw_state).badge(),
    }
}

/// Badge for the acquisition streaming indicator of the stats panel.
pub fn stream_activity(bytes_per_second: f64) -> StatusBadge {
    if bytes_per_second.is_finite() && bytes_per_second > 0.0 {
        StatusBadge::new("Streaming", Severity::Success)
    } else {
        StatusBadge::new("Idle", Severity::Info)
    }
}

/// Declares a backend state enum that round-trips through its raw string and keeps
/// unrecognized values in an `Unknown` arm.
macro_rules! backend_state {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $raw:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Value outside the known table (kept verbatim)
            Unknown(String),
        }

        impl $name {
            /// The raw backend string.
            pub fn as_str(&self) -> &str {
                match self {
                    $( $name::$variant => $raw, )+
                    $name::Unknown(raw) => raw,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::Unknown(String::new())
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                match raw {
                    $( $raw => $name::$variant, )+
                    other => $name::Unknown(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                $name::from(raw.as_str())
            }
        }

        impl From<$name> for String {
            fn from(state: $name) -> Self {
                state.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

backend_state! {
    /// State of the image writer.
    WriterState {
        /// Ready to start writing
        Ready => "READY",
        /// Currently writing
        Writing => "WRITING",
    }
}

backend_state! {
    /// State of the current or last acquisition.
    AcquisitionState {
        /// Writer armed, no images yet
        WaitingForImages => "WAITING_FOR_IMAGES",
        /// Receiving images
        AcquiringImages => "ACQUIRING_IMAGES",
        /// All images received, flushing to disk
        FlushingImages => "FLUSHING_IMAGES",
        /// Completed successfully
        Finished => "FINISHED",
        /// Aborted with an error
        Failed => "FAILED",
    }
}

backend_state! {
    /// State of the last configuration deployment.
    DeploymentStatus {
        /// Deployment in progress
        Running => "RUNNING",
        /// Deployment applied
        Success => "SUCCESS",
        /// Deployment failed
        Error => "ERROR",
    }
}

backend_state! {
    /// State of the UDP simulator.
    SimulatorStatus {
        /// Idle, can be started
        Ready => "READY",
        /// Emitting UDP traffic
        Streaming => "STREAMING",
    }
}

impl Classify for WriterState {
    fn badge(&self) -> StatusBadge {
        match self {
            WriterState::Ready => StatusBadge::new("Ready", Severity::Success),
            WriterState::Writing => StatusBadge::new("Writing", Severity::Info),
            WriterState::Unknown(_) => StatusBadge::UNKNOWN,
        }
    }
}

impl Classify for AcquisitionState {
    fn badge(&self) -> StatusBadge {
        match self {
            AcquisitionState::WaitingForImages => {
                StatusBadge::new("Waiting for images", Severity::Warning)
            }
            AcquisitionState::AcquiringImages => {
                StatusBadge::new("Acquiring images", Severity::Info)
            }
            AcquisitionState::FlushingImages => StatusBadge::new("Flushing images", Severity::Info),
            AcquisitionState::Finished => StatusBadge::new("Finished", Severity::Success),
            AcquisitionState::Failed => StatusBadge::new("Failed", Severity::Error),
            AcquisitionState::Unknown(_) => StatusBadge::UNKNOWN,
        }
    }
}

impl Classify for DeploymentStatus {
    fn badge(&self) -> StatusBadge {
        match self {
            DeploymentStatus::Running => StatusBadge::new("Running", Severity::Info),
            DeploymentStatus::Success => StatusBadge::new("Success", Severity::Success),
            DeploymentStatus::Error => StatusBadge::new("Error", Severity::Error),
            DeploymentStatus::Unknown(_) => StatusBadge::UNKNOWN,
        }
    }
}

impl Classify for SimulatorStatus {
    fn badge(&self) -> StatusBadge {
        match self {
            SimulatorStatus::Ready => StatusBadge::new("Ready", Severity::Success),
            SimulatorStatus::Streaming => StatusBadge::new("Streaming", Severity::Warning),
            SimulatorStatus::Unknown(_) => StatusBadge::UNKNOWN,
        }
    }
}
