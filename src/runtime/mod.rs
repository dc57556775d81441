//! Container runtime seam.
//!
//! The monitor only talks to the runtime through [`ContainerRuntime`]. The
//! production implementation lives in [`docker`] and uses bollard; tests plug
//! in an in-memory fleet.

use async_trait::async_trait;

use crate::monitor::record::{ContainerId, ContainerRecord};

pub mod docker;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Container runtime unreachable: {0}")]
    Unreachable(String),
    #[error("Container {0} not found")]
    NotFound(String),
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
}

/// A container whose details could not be read while listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub identity: ContainerId,
    pub reason: String,
}

/// Result of listing every container, including the ones that failed.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub records: Vec<ContainerRecord>,
    pub failures: Vec<RecordFailure>,
}

/// One resource-usage sample for a single container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSample {
    pub cpu_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

impl UsageSample {
    pub fn memory_percent(&self) -> f64 {
        if self.memory_limit_bytes == 0 {
            return 0.0;
        }
        self.memory_usage_bytes as f64 / self.memory_limit_bytes as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub space_reclaimed_bytes: u64,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Every container the runtime knows about, stopped ones included.
    async fn list_all_containers(&self) -> Result<Listing, RuntimeError>;

    async fn resource_usage(&self, container: &str) -> Result<UsageSample, RuntimeError>;

    async fn restart(&self, container: &str) -> Result<(), RuntimeError>;

    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Removes every stopped container.
    async fn prune_stopped(&self) -> Result<PruneReport, RuntimeError>;
}
