use crate::process::ProcessRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable, timestamped view of the monitored process set.
///
/// Snapshots are built completely by the reconciliation engine and only
/// then published; consumers never observe a partially updated set.
/// Records are ordered by pid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub processes: Vec<ProcessRecord>,
    /// Entries the last full enumeration could not fully read. Non-zero
    /// means the set is valid but degraded, not that anything failed
    /// outright.
    pub partial_entries: usize,
}

impl Snapshot {
    pub fn new(
        taken_at: DateTime<Utc>,
        mut processes: Vec<ProcessRecord>,
        partial_entries: usize,
    ) -> Self {
        processes.sort_by_key(|record| record.pid);
        Snapshot {
            taken_at,
            processes,
            partial_entries,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.partial_entries > 0
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.processes
            .binary_search_by_key(&pid, |record| record.pid)
            .ok()
            .map(|idx| &self.processes[idx])
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.processes.iter().map(|record| record.pid)
    }
}
