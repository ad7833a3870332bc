//! Text filtering over snapshots.

use taskmon_common::process::ProcessRecord;
use taskmon_common::snapshot::Snapshot;

/// Case-insensitive substring match against a snapshot. A record matches
/// when the query appears in its name, its pid rendered as text, or its
/// category label. Snapshot order is preserved; an empty query matches
/// everything.
pub fn filter(snapshot: &Snapshot, query: &str) -> Vec<ProcessRecord> {
    let needle = query.trim().to_lowercase();
    snapshot
        .processes
        .iter()
        .filter(|record| needle.is_empty() || matches(record, &needle))
        .cloned()
        .collect()
}

fn matches(record: &ProcessRecord, needle: &str) -> bool {
    record.name.to_lowercase().contains(needle)
        || record.pid.to_string().contains(needle)
        || record.category.label().to_lowercase().contains(needle)
}
