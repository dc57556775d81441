use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

/// Stable identifier the runtime assigns to a container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 12 character prefix docker shows in its CLI.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStatus {
    Running,
    Exited,
    Stopped,
    Created,
    Paused,
    Restarting,
    Dead,
    Other,
}

impl LifecycleStatus {
    /// Maps the runtime's state string. Anything unknown (`removing`, empty)
    /// becomes `Other`.
    pub fn from_runtime(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" => LifecycleStatus::Running,
            "exited" => LifecycleStatus::Exited,
            "stopped" => LifecycleStatus::Stopped,
            "created" => LifecycleStatus::Created,
            "paused" => LifecycleStatus::Paused,
            "restarting" => LifecycleStatus::Restarting,
            "dead" => LifecycleStatus::Dead,
            _ => LifecycleStatus::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Running => "running",
            LifecycleStatus::Exited => "exited",
            LifecycleStatus::Stopped => "stopped",
            LifecycleStatus::Created => "created",
            LifecycleStatus::Paused => "paused",
            LifecycleStatus::Restarting => "restarting",
            LifecycleStatus::Dead => "dead",
            LifecycleStatus::Other => "other",
        }
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, LifecycleStatus::Exited | LifecycleStatus::Stopped)
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

/// Normalized view of one container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub identity: ContainerId,
    pub display_name: String,
    pub image_reference: String,
    pub lifecycle_status: LifecycleStatus,
    pub created_at: Option<DateTime<Utc>>,
    /// Time of the most recent start. `None` if the container never ran.
    pub started_at: Option<DateTime<Utc>>,
    /// Keyed by container port, e.g. `80/tcp`.
    pub port_bindings: BTreeMap<String, Vec<HostBinding>>,
    pub labels: HashMap<String, String>,
}

/// A complete point-in-time mapping of the fleet. Ordered by identity so
/// anything derived from it iterates deterministically.
pub type Snapshot = BTreeMap<ContainerId, ContainerRecord>;

/// The runtime reports "never started" as the zero time.
const ZERO_TIME_YEAR: &str = "0001-01-01";

/// Parses a runtime timestamp (RFC 3339, nanosecond precision).
/// Empty strings and the zero time map to `None`.
pub fn parse_runtime_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with(ZERO_TIME_YEAR) {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            log::debug!("Unable to parse runtime timestamp {raw:?}: {e}");
            None
        }
    }
}
