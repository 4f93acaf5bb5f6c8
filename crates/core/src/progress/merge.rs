//! Reconciliation of two progress replicas.

use super::types::ProgressRecord;

/// Which side supplies `current` and `last_run` in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Local,
    Remote,
}

/// Merge a local and a remote replica.
///
/// - `completed`: remote entries in their order, then local entries the
///   remote lacks, in local order. Never shrinks either side.
/// - `worker_leases`: union by worker id; on a collision the later
///   `last_active` wins, ties go to the authoritative side.
/// - `current`: from the authoritative side.
/// - `last_run`: from the authoritative side, else whichever side has one.
///
/// `merge(&merge(a, b, x), b, x) == merge(a, b, x)` for any `x`.
pub fn merge(local: &ProgressRecord, remote: &ProgressRecord, authority: Authority) -> ProgressRecord {
    let mut merged = ProgressRecord::with_completed(
        remote.completed().iter().chain(local.completed()).cloned(),
    );

    merged.worker_leases = remote.worker_leases.clone();
    for (worker_id, lease) in &local.worker_leases {
        let take_local = match remote.worker_leases.get(worker_id) {
            None => true,
            Some(theirs) => {
                lease.last_active > theirs.last_active
                    || (lease.last_active == theirs.last_active && authority == Authority::Local)
            }
        };
        if take_local {
            merged
                .worker_leases
                .insert(worker_id.clone(), lease.clone());
        }
    }

    let (primary, secondary) = match authority {
        Authority::Local => (local, remote),
        Authority::Remote => (remote, local),
    };
    merged.current = primary.current.clone();
    merged.last_run = primary.last_run.or(secondary.last_run);

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::progress::{TaskKey, WorkerLease};
    use chrono::{TimeDelta, TimeZone, Utc};

    fn task(doc_number: u32) -> TaskKey {
        TaskKey::new("2024", "Pune", "Haveli", "Hadapsar", doc_number).unwrap()
    }

    fn sample_pair() -> (ProgressRecord, ProgressRecord) {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let mut local = ProgressRecord::with_completed(["B", "C"]);
        local.current = Some(task(1));
        local.last_run = Some(t0);
        local
            .worker_leases
            .insert("w1".to_string(), WorkerLease::new(t0, Some(task(1))));
        local.worker_leases.insert(
            "w2".to_string(),
            WorkerLease::new(t0 - TimeDelta::minutes(5), Some(task(2))),
        );

        let mut remote = ProgressRecord::with_completed(["A", "B"]);
        remote.current = Some(task(7));
        remote.worker_leases.insert(
            "w2".to_string(),
            WorkerLease::new(t0, Some(task(3))),
        );
        remote.worker_leases.insert(
            "w3".to_string(),
            WorkerLease::new(t0, None),
        );

        (local, remote)
    }

    #[test]
    fn test_completed_union_remote_order_first() {
        let local = ProgressRecord::with_completed(["B", "C"]);
        let remote = ProgressRecord::with_completed(["A", "B"]);

        let merged = merge(&local, &remote, Authority::Remote);
        assert_eq!(merged.completed(), ["A", "B", "C"]);
    }

    #[test]
    fn test_union_contains_both_sides_without_repeats() {
        let (local, remote) = sample_pair();
        for authority in [Authority::Local, Authority::Remote] {
            let merged = merge(&local, &remote, authority);
            for key in local.completed().iter().chain(remote.completed()) {
                assert!(merged.is_completed(key));
            }
            let unique: HashSet<_> = merged.completed().iter().collect();
            assert_eq!(unique.len(), merged.completed().len());
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (local, remote) = sample_pair();
        for authority in [Authority::Local, Authority::Remote] {
            let once = merge(&local, &remote, authority);
            let twice = merge(&once, &remote, authority);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_leases_latest_writer_wins() {
        let (local, remote) = sample_pair();
        let merged = merge(&local, &remote, Authority::Local);

        assert_eq!(merged.worker_leases.len(), 3);
        assert_eq!(merged.worker_leases["w1"].current_task, Some(task(1)));
        // remote's w2 entry is newer than local's
        assert_eq!(merged.worker_leases["w2"].current_task, Some(task(3)));
        assert!(merged.worker_leases.contains_key("w3"));
    }

    #[test]
    fn test_authority_selects_current_and_last_run() {
        let (local, remote) = sample_pair();

        let local_wins = merge(&local, &remote, Authority::Local);
        assert_eq!(local_wins.current, Some(task(1)));
        assert_eq!(local_wins.last_run, local.last_run);

        let remote_wins = merge(&local, &remote, Authority::Remote);
        assert_eq!(remote_wins.current, Some(task(7)));
        // remote has no last_run, so local's fills in
        assert_eq!(remote_wins.last_run, local.last_run);
    }

    #[test]
    fn test_merge_with_empty_remote_keeps_local() {
        let (local, _) = sample_pair();
        let merged = merge(&local, &ProgressRecord::default(), Authority::Local);
        assert_eq!(merged, local);
    }
}
