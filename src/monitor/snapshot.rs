use std::collections::btree_map::Entry;

use crate::monitor::record::Snapshot;
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Reads the whole fleet into a [`Snapshot`].
///
/// Fails only if the runtime itself cannot be reached. Containers whose
/// details could not be read are logged and left out, so the caller always
/// gets a total (if possibly incomplete) snapshot.
pub async fn read_snapshot(runtime: &dyn ContainerRuntime) -> Result<Snapshot, RuntimeError> {
    let listing = runtime.list_all_containers().await?;

    for failure in &listing.failures {
        log::warn!(
            "Dropping container {} from snapshot: {}",
            failure.identity.short(),
            failure.reason
        );
    }

    let mut snapshot = Snapshot::new();
    for record in listing.records {
        match snapshot.entry(record.identity.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(_) => {
                log::warn!(
                    "Runtime reported container {} twice, keeping the first record",
                    record.identity.short()
                );
            }
        }
    }

    log::debug!("Read snapshot with {} containers", snapshot.len());
    Ok(snapshot)
}
