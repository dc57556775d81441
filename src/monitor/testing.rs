//! In-memory runtime and sinks shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::monitor::dispatcher::{DeliveryError, NotificationSink};
use crate::monitor::record::{ContainerId, ContainerRecord, LifecycleStatus, Snapshot};
use crate::runtime::{
    ContainerRuntime, Listing, PruneReport, RecordFailure, RuntimeError, UsageSample,
};

/// A container whose start time is `started` seconds after the epoch.
pub fn record(id: &str, status: LifecycleStatus, started: Option<i64>) -> ContainerRecord {
    ContainerRecord {
        identity: ContainerId::new(id),
        display_name: format!("{id}-name"),
        image_reference: format!("{id}/image:latest"),
        lifecycle_status: status,
        created_at: Utc.timestamp_opt(0, 0).single(),
        started_at: started.and_then(|s| Utc.timestamp_opt(s, 0).single()),
        port_bindings: Default::default(),
        labels: HashMap::new(),
    }
}

pub fn snapshot(records: Vec<ContainerRecord>) -> Snapshot {
    records
        .into_iter()
        .map(|r| (r.identity.clone(), r))
        .collect()
}

#[derive(Default)]
pub struct FakeRuntime {
    fleet: Mutex<Vec<ContainerRecord>>,
    failures: Mutex<Vec<RecordFailure>>,
    usage: Mutex<HashMap<String, UsageSample>>,
    unreachable: AtomicBool,
    list_delay: Mutex<Option<Duration>>,
    pub list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub restarts: Mutex<Vec<String>>,
    pub prunes: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fleet(&self, fleet: Vec<ContainerRecord>) {
        *self.fleet.lock().unwrap() = fleet;
    }

    pub fn set_failures(&self, failures: Vec<RecordFailure>) {
        *self.failures.lock().unwrap() = failures;
    }

    pub fn set_usage(&self, name: &str, sample: UsageSample) {
        self.usage.lock().unwrap().insert(name.to_string(), sample);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes every listing take `delay` of (virtual) time.
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    fn find(&self, name: &str) -> Option<ContainerRecord> {
        self.fleet
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.display_name == name || r.identity.as_str() == name)
            .cloned()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_all_containers(&self) -> Result<Listing, RuntimeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unreachable("connection refused".to_string()));
        }
        Ok(Listing {
            records: self.fleet.lock().unwrap().clone(),
            failures: self.failures.lock().unwrap().clone(),
        })
    }

    async fn resource_usage(&self, container: &str) -> Result<UsageSample, RuntimeError> {
        self.usage
            .lock()
            .unwrap()
            .get(container)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(container.to_string()))
    }

    async fn restart(&self, container: &str) -> Result<(), RuntimeError> {
        if self.find(container).is_none() {
            return Err(RuntimeError::NotFound(container.to_string()));
        }
        self.restarts.lock().unwrap().push(container.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn prune_stopped(&self) -> Result<PruneReport, RuntimeError> {
        self.prunes.fetch_add(1, Ordering::SeqCst);
        let mut fleet = self.fleet.lock().unwrap();
        let removed = fleet
            .iter()
            .filter(|r| r.lifecycle_status.is_stopped())
            .map(|r| r.identity.to_string())
            .collect();
        fleet.retain(|r| !r.lifecycle_status.is_stopped());
        Ok(PruneReport {
            removed,
            space_reclaimed_bytes: 1024,
        })
    }
}

/// Records every delivered message.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Fails the first `fail_first` deliveries (all of them with `usize::MAX`).
pub struct FlakySink {
    fail_first: usize,
    limit: Option<usize>,
    pub attempts: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
}

impl FlakySink {
    pub fn new(fail_first: usize) -> Self {
        Self {
            fail_first,
            limit: None,
            attempts: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Advertises a maximum message length of `limit` characters.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
impl NotificationSink for FlakySink {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(DeliveryError::Rejected {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn max_message_len(&self) -> Option<usize> {
        self.limit
    }
}
