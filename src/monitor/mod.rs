//! Container lifecycle change detection.
//!
//! The [`scheduler::PollingScheduler`] periodically reads a
//! [`record::Snapshot`] of the fleet, diffs it against the
//! [`store::FleetStore`] with [`classifier::classify`], hands the resulting
//! [`classifier::ChangeSet`] to the [`dispatcher::Dispatcher`] and then
//! commits the new snapshot. Command handlers only ever read the store.

pub mod classifier;
pub mod dispatcher;
pub mod record;
pub mod scheduler;
pub mod snapshot;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
