use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::monitor::classifier::classify;
use crate::monitor::dispatcher::{DispatchReport, Dispatcher};
use crate::monitor::snapshot::read_snapshot;
use crate::monitor::store::FleetStore;
use crate::runtime::ContainerRuntime;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u32)]
pub enum SchedulerStatus {
    NotStarted = 0,
    /// Claimed by `start`, seeding the store.
    Starting = 1,
    Running = 2,
    Stopped = 3,
}

impl SchedulerStatus {
    #[inline]
    fn from_u32(val: u32) -> SchedulerStatus {
        match val {
            0 => SchedulerStatus::NotStarted,
            1 => SchedulerStatus::Starting,
            2 => SchedulerStatus::Running,
            _ => SchedulerStatus::Stopped,
        }
    }
}

struct AtomicSchedulerStatus(AtomicU32);

impl AtomicSchedulerStatus {
    fn new(val: SchedulerStatus) -> Self {
        AtomicSchedulerStatus(AtomicU32::new(val as u32))
    }
    fn load(&self) -> SchedulerStatus {
        SchedulerStatus::from_u32(self.0.load(Ordering::SeqCst))
    }
    fn store(&self, value: SchedulerStatus) {
        self.0.store(value as u32, Ordering::SeqCst)
    }
    fn transition(&self, from: SchedulerStatus, to: SchedulerStatus) -> bool {
        self.0
            .compare_exchange(from as u32, to as u32, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler was already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First successful snapshot, committed without classification.
    Seeded { containers: usize },
    Committed {
        changes: usize,
        report: DispatchReport,
    },
    /// The snapshot could not be read. Nothing was committed.
    Aborted,
}

/// Drives Snapshot -> Classify -> Dispatch -> Commit on a fixed interval.
pub struct PollingScheduler {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<FleetStore>,
    dispatcher: Dispatcher,
    interval: Duration,
    status: AtomicSchedulerStatus,
    seeded: AtomicBool,
    // Serializes cycles so each one diffs against the previous commit.
    cycle_lock: Mutex<()>,
}

impl PollingScheduler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<FleetStore>,
        dispatcher: Dispatcher,
        interval: Duration,
    ) -> Self {
        Self {
            runtime,
            store,
            dispatcher,
            interval,
            status: AtomicSchedulerStatus::new(SchedulerStatus::NotStarted),
            seeded: AtomicBool::new(false),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.load()
    }

    /// Runs one poll cycle. Until a first snapshot has been committed, the
    /// cycle seeds the store instead of classifying, so existing containers
    /// are not announced as created.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        let poll_start = std::time::Instant::now();

        let snapshot = match read_snapshot(self.runtime.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("Poll cycle aborted, keeping previous fleet state: {e}");
                return CycleOutcome::Aborted;
            }
        };

        if !self.seeded.load(Ordering::SeqCst) {
            let containers = snapshot.len();
            self.store.commit(snapshot);
            self.seeded.store(true, Ordering::SeqCst);
            log::info!("Seeded fleet state with {containers} containers");
            return CycleOutcome::Seeded { containers };
        }

        let previous = self.store.current();
        let changes = classify(&previous.containers, &snapshot);

        let report = if changes.is_empty() {
            DispatchReport::default()
        } else {
            log::info!(
                "Detected {} created, {} removed, {} restarted, {} status changes",
                changes.created.len(),
                changes.removed.len(),
                changes.restarted.len(),
                changes.status_changed.len()
            );
            self.dispatcher.dispatch(&changes).await
        };

        // Commit regardless of how delivery went.
        self.store.commit(snapshot);

        log::debug!("Poll cycle took {:?}", poll_start.elapsed());
        CycleOutcome::Committed {
            changes: changes.len(),
            report,
        }
    }

    /// Seeds the store and spawns the polling task.
    ///
    /// A failed seed is logged and does not prevent starting; the first
    /// successful tick seeds instead.
    pub async fn start(self: Arc<Self>) -> Result<SchedulerHandle, SchedulerError> {
        // Claim before seeding so a concurrent caller never runs a cycle.
        if !self
            .status
            .transition(SchedulerStatus::NotStarted, SchedulerStatus::Starting)
        {
            return Err(SchedulerError::AlreadyStarted);
        }

        if let CycleOutcome::Aborted = self.run_cycle().await {
            log::warn!("Initial snapshot failed, will seed on the next tick");
        }
        self.status.store(SchedulerStatus::Running);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(&self);
        let task = tokio::spawn(scheduler.poll_loop(shutdown_rx));

        log::info!("Polling every {:?}", self.interval);
        Ok(SchedulerHandle {
            scheduler: self,
            shutdown_tx,
            task,
        })
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow cycle pushes the next tick back instead of bunching ticks up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and we just seeded.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // The cycle runs outside the select, a shutdown request
                    // waits for it to finish.
                    self.run_cycle().await;
                }
            }
        }

        self.status.store(SchedulerStatus::Stopped);
        log::info!("Polling scheduler stopped");
    }
}

pub struct SchedulerHandle {
    scheduler: Arc<PollingScheduler>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Asks the polling task to stop and waits for the in-flight cycle.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            log::error!("Polling task ended abnormally: {e}");
        }
        self.scheduler.status.store(SchedulerStatus::Stopped);
    }
}
