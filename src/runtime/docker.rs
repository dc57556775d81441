//! Docker runtime using bollard.
//!
//! Listing is done in two steps: `list_containers` (all, including stopped)
//! for the identities, then `inspect_container` per identity for the start
//! time and port bindings. An inspect failure only drops that container.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerInspectResponse, ContainerStatsResponse, PortBinding};
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, ListContainersOptions,
    ListContainersOptionsBuilder, PruneContainersOptions, RestartContainerOptions,
    RestartContainerOptionsBuilder, StatsOptions, StatsOptionsBuilder,
};
use futures_util::{StreamExt, future};

use crate::monitor::record::{
    ContainerId, ContainerRecord, HostBinding, LifecycleStatus, parse_runtime_timestamp,
};
use crate::runtime::{
    ContainerRuntime, Listing, PruneReport, RecordFailure, RuntimeError, UsageSample,
};

/// Seconds docker waits for a graceful stop before killing on restart.
const RESTART_GRACE_SECONDS: i32 = 10;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Builds a client using the default connection method
    /// (Unix socket on Linux/macOS, named pipe on Windows).
    /// This does not contact the daemon yet.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn inspect(&self, id: &str) -> Result<ContainerRecord, RuntimeError> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();
        let info = self
            .docker
            .inspect_container(id, Some(options))
            .await
            .map_err(|e| not_found_or(e, id))?;
        record_from_inspect(info).ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }
}

fn not_found_or(e: bollard::errors::Error, container: &str) -> RuntimeError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container.to_string()),
        e => RuntimeError::DockerApi(e),
    }
}

/// Normalizes an inspect response. Returns `None` when the response carries
/// no id, which docker never does for an existing container.
pub(crate) fn record_from_inspect(info: ContainerInspectResponse) -> Option<ContainerRecord> {
    let identity = ContainerId::new(info.id?);

    let display_name = info
        .name
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| identity.short().to_string());

    let (status, started_at) = match info.state {
        Some(state) => (
            state
                .status
                .map(|s| LifecycleStatus::from_runtime(&s.to_string()))
                .unwrap_or(LifecycleStatus::Other),
            state.started_at.as_deref().and_then(parse_runtime_timestamp),
        ),
        None => (LifecycleStatus::Other, None),
    };

    let (image_reference, labels) = match info.config {
        Some(config) => (config.image, config.labels.unwrap_or_default()),
        None => (None, Default::default()),
    };
    // Fall back to the image id if the container config does not carry a tag.
    let image_reference = image_reference
        .or(info.image)
        .unwrap_or_else(|| "unknown".to_string());

    let port_bindings = info
        .network_settings
        .and_then(|settings| settings.ports)
        .map(|ports| {
            ports
                .into_iter()
                .map(|(port, bindings)| (port, host_bindings(bindings)))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Some(ContainerRecord {
        identity,
        display_name,
        image_reference,
        lifecycle_status: status,
        created_at: info.created.as_deref().and_then(parse_runtime_timestamp),
        started_at,
        port_bindings,
        labels,
    })
}

fn host_bindings(bindings: Option<Vec<PortBinding>>) -> Vec<HostBinding> {
    bindings
        .unwrap_or_default()
        .into_iter()
        .map(|b| HostBinding {
            host_ip: b.host_ip,
            host_port: b.host_port,
        })
        .collect()
}

/// Same arithmetic as `docker stats`: CPU is the container's share of the
/// host delta between the two samples, memory excludes the page cache.
pub(crate) fn usage_from_stats(stats: &ContainerStatsResponse) -> UsageSample {
    let mut sample = UsageSample::default();

    if let (Some(cpu), Some(precpu)) = (&stats.cpu_stats, &stats.precpu_stats) {
        let total = |s: &bollard::models::ContainerCpuStats| {
            s.cpu_usage
                .as_ref()
                .and_then(|u| u.total_usage)
                .unwrap_or(0)
        };
        let cpu_delta = total(cpu).saturating_sub(total(precpu));
        let system_delta = cpu
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(precpu.system_cpu_usage.unwrap_or(0));
        let online_cpus = cpu.online_cpus.map(u64::from).unwrap_or_else(|| {
            cpu.cpu_usage
                .as_ref()
                .and_then(|u| u.percpu_usage.as_ref())
                .map(|p| p.len() as u64)
                .unwrap_or(1)
        });
        if cpu_delta > 0 && system_delta > 0 {
            sample.cpu_percent =
                cpu_delta as f64 / system_delta as f64 * online_cpus as f64 * 100.0;
        }
    }

    if let Some(memory) = &stats.memory_stats {
        let usage = memory.usage.unwrap_or(0);
        // cgroup v2 reports `inactive_file`, v1 `total_inactive_file`.
        let cache = memory
            .stats
            .as_ref()
            .and_then(|s| s.get("inactive_file").or_else(|| s.get("total_inactive_file")))
            .copied()
            .unwrap_or(0);
        sample.memory_usage_bytes = usage.saturating_sub(cache);
        sample.memory_limit_bytes = memory.limit.unwrap_or(0);
    }

    if let Some(networks) = &stats.networks {
        for net in networks.values() {
            sample.network_rx_bytes += net.rx_bytes.unwrap_or(0);
            sample.network_tx_bytes += net.tx_bytes.unwrap_or(0);
        }
    }

    sample
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_all_containers(&self) -> Result<Listing, RuntimeError> {
        let options: ListContainersOptions = ListContainersOptionsBuilder::new().all(true).build();
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))?;

        let ids: Vec<String> = summaries.into_iter().filter_map(|s| s.id).collect();
        let inspections = future::join_all(ids.iter().map(|id| self.inspect(id))).await;

        let mut listing = Listing::default();
        for (id, result) in ids.into_iter().zip(inspections) {
            match result {
                Ok(record) => listing.records.push(record),
                Err(e) => listing.failures.push(RecordFailure {
                    identity: ContainerId::new(id),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(listing)
    }

    async fn resource_usage(&self, container: &str) -> Result<UsageSample, RuntimeError> {
        let options: StatsOptions = StatsOptionsBuilder::new().stream(false).build();
        let mut stream = self.docker.stats(container, Some(options));
        match stream.next().await {
            Some(Ok(stats)) => Ok(usage_from_stats(&stats)),
            Some(Err(e)) => Err(not_found_or(e, container)),
            None => Err(RuntimeError::NotFound(container.to_string())),
        }
    }

    async fn restart(&self, container: &str) -> Result<(), RuntimeError> {
        log::info!("Restarting container: {container}");
        let options: RestartContainerOptions = RestartContainerOptionsBuilder::new()
            .t(RESTART_GRACE_SECONDS)
            .build();
        self.docker
            .restart_container(container, Some(options))
            .await
            .map_err(|e| not_found_or(e, container))
            .inspect_err(|e| log::error!("Failed to restart container {container}: {e}"))?;
        log::info!("Container {container} restarted successfully");
        Ok(())
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))
    }

    async fn prune_stopped(&self) -> Result<PruneReport, RuntimeError> {
        log::warn!("Pruning stopped containers");
        let response = self
            .docker
            .prune_containers(None::<PruneContainersOptions>)
            .await?;
        let report = PruneReport {
            removed: response.containers_deleted.unwrap_or_default(),
            space_reclaimed_bytes: response.space_reclaimed.unwrap_or(0).max(0) as u64,
        };
        log::info!(
            "Pruned {} containers, reclaimed {} bytes",
            report.removed.len(),
            report.space_reclaimed_bytes
        );
        Ok(report)
    }
}
