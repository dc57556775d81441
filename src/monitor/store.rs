use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::monitor::record::Snapshot;

/// The last committed view of the fleet.
#[derive(Debug, Clone, Default)]
pub struct FleetState {
    pub containers: Snapshot,
    /// `None` until the first commit.
    pub last_update: Option<DateTime<Utc>>,
}

/// Holds the committed [`FleetState`].
///
/// Commits install a whole new state with a single pointer swap, so readers
/// either see the previous snapshot or the new one, never a mix. Reads do not
/// lock and do not wait on the writer.
#[derive(Debug)]
pub struct FleetStore {
    state: ArcSwap<FleetState>,
}

impl Default for FleetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetStore {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(FleetState::default()),
        }
    }

    pub fn current(&self) -> Arc<FleetState> {
        self.state.load_full()
    }

    /// Only the polling scheduler should call this.
    pub fn commit(&self, snapshot: Snapshot) {
        let state = FleetState {
            containers: snapshot,
            last_update: Some(Utc::now()),
        };
        self.state.store(Arc::new(state));
    }
}
