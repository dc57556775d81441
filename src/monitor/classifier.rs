use crate::monitor::record::{ContainerRecord, LifecycleStatus, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub record: ContainerRecord,
    pub old: LifecycleStatus,
    pub new: LifecycleStatus,
}

/// Lifecycle events found between two snapshots. Each list is ordered by
/// container identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub created: Vec<ContainerRecord>,
    pub removed: Vec<ContainerRecord>,
    pub restarted: Vec<ContainerRecord>,
    pub status_changed: Vec<StatusChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.removed.is_empty()
            && self.restarted.is_empty()
            && self.status_changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.removed.len() + self.restarted.len() + self.status_changed.len()
    }
}

/// Diffs `old` against `new`.
///
/// A container that is running in `new` with a different start time is a
/// restart, even if its status also changed; it is never reported twice.
/// Records in the result are taken from `new`, except for removals.
pub fn classify(old: &Snapshot, new: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (id, current) in new {
        let Some(previous) = old.get(id) else {
            changes.created.push(current.clone());
            continue;
        };

        if current.lifecycle_status == LifecycleStatus::Running
            && current.started_at != previous.started_at
        {
            changes.restarted.push(current.clone());
        } else if current.lifecycle_status != previous.lifecycle_status {
            changes.status_changed.push(StatusChange {
                record: current.clone(),
                old: previous.lifecycle_status,
                new: current.lifecycle_status,
            });
        }
    }

    changes.removed = old
        .iter()
        .filter(|(id, _)| !new.contains_key(*id))
        .map(|(_, record)| record.clone())
        .collect();

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::record::ContainerId;
    use crate::monitor::testing::{record, snapshot};
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;
    use std::collections::HashSet;

    const STATUSES: [LifecycleStatus; 8] = [
        LifecycleStatus::Running,
        LifecycleStatus::Exited,
        LifecycleStatus::Stopped,
        LifecycleStatus::Created,
        LifecycleStatus::Paused,
        LifecycleStatus::Restarting,
        LifecycleStatus::Dead,
        LifecycleStatus::Other,
    ];

    /// Small id and timestamp spaces so generated snapshots overlap often.
    #[derive(Debug, Clone)]
    struct ArbSnapshot(Snapshot);

    impl Arbitrary for ArbSnapshot {
        fn arbitrary(g: &mut Gen) -> Self {
            let entries: Vec<(u8, u8, Option<u8>)> = Arbitrary::arbitrary(g);
            let records = entries
                .into_iter()
                .map(|(id, status, started)| {
                    record(
                        &format!("c{}", id % 8),
                        STATUSES[status as usize % STATUSES.len()],
                        started.map(|s| i64::from(s % 4)),
                    )
                })
                .collect();
            ArbSnapshot(snapshot(records))
        }
    }

    fn ids(records: &[ContainerRecord]) -> Vec<&str> {
        records.iter().map(|r| r.identity.as_str()).collect()
    }

    #[quickcheck]
    fn prop_deterministic(a: ArbSnapshot, b: ArbSnapshot) -> bool {
        classify(&a.0, &b.0) == classify(&a.0, &b.0)
    }

    #[quickcheck]
    fn prop_identical_snapshots_are_quiet(a: ArbSnapshot) -> bool {
        classify(&a.0, &a.0).is_empty()
    }

    #[quickcheck]
    fn prop_categories_are_disjoint(a: ArbSnapshot, b: ArbSnapshot) -> bool {
        let changes = classify(&a.0, &b.0);
        let mut seen = HashSet::new();
        changes
            .created
            .iter()
            .chain(&changes.removed)
            .chain(&changes.restarted)
            .chain(changes.status_changed.iter().map(|c| &c.record))
            .all(|r| seen.insert(r.identity.clone()))
    }

    #[quickcheck]
    fn prop_creations_and_removals_match_key_sets(a: ArbSnapshot, b: ArbSnapshot) -> bool {
        let changes = classify(&a.0, &b.0);
        let created: Vec<&ContainerId> = b.0.keys().filter(|k| !a.0.contains_key(*k)).collect();
        let removed: Vec<&ContainerId> = a.0.keys().filter(|k| !b.0.contains_key(*k)).collect();
        changes.created.iter().map(|r| &r.identity).eq(created)
            && changes.removed.iter().map(|r| &r.identity).eq(removed)
    }

    #[test]
    fn test_created_from_empty() {
        let old = Snapshot::new();
        let new = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let changes = classify(&old, &new);
        assert_eq!(ids(&changes.created), vec!["x"]);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_removed_to_empty() {
        let old = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let changes = classify(&old, &Snapshot::new());
        assert_eq!(ids(&changes.removed), vec!["x"]);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_restart_takes_precedence_over_status_change() {
        let old = snapshot(vec![record("x", LifecycleStatus::Exited, Some(1))]);
        let new = snapshot(vec![record("x", LifecycleStatus::Running, Some(2))]);
        let changes = classify(&old, &new);
        assert_eq!(ids(&changes.restarted), vec!["x"]);
        assert!(changes.status_changed.is_empty());
    }

    #[test]
    fn test_restart_while_running() {
        let old = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let new = snapshot(vec![record("x", LifecycleStatus::Running, Some(5))]);
        assert_eq!(ids(&classify(&old, &new).restarted), vec!["x"]);
    }

    #[test]
    fn test_first_start_counts_as_restart() {
        let old = snapshot(vec![record("x", LifecycleStatus::Created, None)]);
        let new = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let changes = classify(&old, &new);
        assert_eq!(ids(&changes.restarted), vec!["x"]);
        assert!(changes.status_changed.is_empty());
    }

    #[test]
    fn test_status_change_without_restart() {
        let old = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let new = snapshot(vec![record("x", LifecycleStatus::Exited, Some(1))]);
        let changes = classify(&old, &new);
        assert!(changes.restarted.is_empty());
        assert_eq!(changes.status_changed.len(), 1);
        assert_eq!(changes.status_changed[0].old, LifecycleStatus::Running);
        assert_eq!(changes.status_changed[0].new, LifecycleStatus::Exited);
    }

    #[test]
    fn test_running_with_same_start_is_not_a_restart() {
        let old = snapshot(vec![record("x", LifecycleStatus::Paused, Some(1))]);
        let new = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let changes = classify(&old, &new);
        assert!(changes.restarted.is_empty());
        assert_eq!(changes.status_changed.len(), 1);
    }

    #[test]
    fn test_unchanged_container_is_quiet() {
        let mut relabeled = record("x", LifecycleStatus::Running, Some(1));
        relabeled.labels.insert("a".to_string(), "b".to_string());
        let old = snapshot(vec![record("x", LifecycleStatus::Running, Some(1))]);
        let new = snapshot(vec![relabeled]);
        assert!(classify(&old, &new).is_empty());
    }

    #[test]
    fn test_mixed_changes_are_ordered_by_identity() {
        let old = snapshot(vec![
            record("b", LifecycleStatus::Running, Some(1)),
            record("d", LifecycleStatus::Running, Some(1)),
            record("e", LifecycleStatus::Running, Some(1)),
        ]);
        let new = snapshot(vec![
            record("c", LifecycleStatus::Running, Some(1)),
            record("a", LifecycleStatus::Running, Some(1)),
            record("d", LifecycleStatus::Exited, Some(1)),
            record("e", LifecycleStatus::Running, Some(2)),
        ]);
        let changes = classify(&old, &new);
        assert_eq!(ids(&changes.created), vec!["a", "c"]);
        assert_eq!(ids(&changes.removed), vec!["b"]);
        assert_eq!(ids(&changes.restarted), vec!["e"]);
        assert_eq!(changes.status_changed.len(), 1);
        assert_eq!(changes.status_changed[0].record.identity.as_str(), "d");
    }
}
