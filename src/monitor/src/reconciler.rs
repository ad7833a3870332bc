//! Reconciliation engine: keeps the monitored set converged with OS
//! reality and publishes immutable snapshots.

use crate::catalog::{CatalogEntry, ProcessCatalog};
use crate::tracker::{TrackerId, UtilizationProbe};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use taskmon_common::error::MetricError;
use taskmon_common::process::ProcessRecord;
use taskmon_common::snapshot::Snapshot;
use taskmon_common::status::StatusRecorder;
use tokio::sync::{watch, Notify, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Which rows the consumer currently has on screen. Metric refresh is
/// limited to these pids (plus the selection) so a host with thousands
/// of processes does not pay O(n) sampling calls per tick.
#[derive(Clone, Debug, Default)]
pub struct Focus {
    pub visible: Vec<u32>,
    pub selected: Option<u32>,
}

/// Cadence and cost bounds. `full_scan_every` trades bounded steady-state
/// cost for a bounded detection delay on off-screen new processes; it is
/// a tunable, not a contract.
#[derive(Clone, Copy, Debug)]
pub struct EngineTuning {
    /// Full catalog re-scan every Nth cycle.
    pub full_scan_every: u32,
    /// Cap on rows sampled per cycle when no explicit focus is set.
    pub metric_window: usize,
}

impl Default for EngineTuning {
    fn default() -> Self {
        EngineTuning {
            full_scan_every: 5,
            metric_window: 50,
        }
    }
}

struct Tracked {
    record: ProcessRecord,
    tracker: Option<TrackerId>,
    /// Catalog-reported start time; with the pid and name this pins one
    /// incarnation of a process.
    started: u64,
}

/// Authoritative pid -> (record, tracker) mapping. Single owner: the
/// reconciler. All mutation funnels through it; readers only ever see
/// the published snapshot copies.
#[derive(Default)]
struct MonitorSet {
    entries: BTreeMap<u32, Tracked>,
}

impl MonitorSet {
    fn pids(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    fn get_mut(&mut self, pid: u32) -> Option<&mut Tracked> {
        self.entries.get_mut(&pid)
    }

    fn insert(&mut self, tracked: Tracked) {
        self.entries.insert(tracked.record.pid, tracked);
    }

    fn remove(&mut self, pid: u32) -> Option<Tracked> {
        self.entries.remove(&pid)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Drives the per-cycle IDLE → SCANNING → DIFFING → PUBLISHING pass.
pub struct Reconciler<C, P> {
    catalog: C,
    probe: P,
    set: MonitorSet,
    publisher: watch::Sender<Arc<Snapshot>>,
    status: StatusRecorder,
    focus: Arc<RwLock<Focus>>,
    tuning: EngineTuning,
    cycles: u64,
    /// Unreadable-entry count from the most recent full scan.
    partial_entries: usize,
}

impl<C: ProcessCatalog, P: UtilizationProbe> Reconciler<C, P> {
    pub fn new(
        catalog: C,
        probe: P,
        publisher: watch::Sender<Arc<Snapshot>>,
        status: StatusRecorder,
        focus: Arc<RwLock<Focus>>,
        tuning: EngineTuning,
    ) -> Self {
        Reconciler {
            catalog,
            probe,
            set: MonitorSet::default(),
            publisher,
            status,
            focus,
            tuning,
            cycles: 0,
            partial_entries: 0,
        }
    }

    /// One reconciliation pass. Cheap cycles probe only the tracked
    /// pids; every Nth cycle (and every forced one) re-scans the whole
    /// catalog so brand-new processes outside the visible window still
    /// surface.
    pub async fn run_cycle(&mut self, force_full: bool) {
        let full = force_full || self.cycles % u64::from(self.tuning.full_scan_every.max(1)) == 0;
        self.cycles += 1;

        trace!(cycle = self.cycles, full, "scanning");
        let scan = if full {
            self.catalog.scan_all()
        } else {
            let tracked = self.set.pids();
            self.catalog.probe(&tracked)
        };
        // Only full scans see the whole table, so only they can say how
        // degraded the enumeration is.
        if full && scan.partial != self.partial_entries {
            if scan.partial > 0 {
                debug!(partial = scan.partial, "enumeration degraded");
                self.status.push(format!(
                    "{} processes could not be fully read",
                    scan.partial
                ));
            }
            self.partial_entries = scan.partial;
        }

        let focus = self.focus.read().await.clone();
        self.diff(scan.entries, full, &focus);
        self.publish();
    }

    /// Forced full pass, for one-shot collection and out-of-band
    /// refresh requests.
    pub async fn collect_now(&mut self) -> Arc<Snapshot> {
        self.run_cycle(true).await;
        self.publisher.borrow().clone()
    }

    fn diff(&mut self, entries: Vec<CatalogEntry>, full: bool, focus: &Focus) {
        let seen: HashSet<u32> = entries.iter().map(|entry| entry.pid).collect();

        // Removals first: on a full cycle anything not in the scan is
        // gone; on a cheap cycle the probe covered every tracked pid, so
        // absence means the same thing.
        for pid in self.set.pids() {
            if !seen.contains(&pid) {
                self.drop_tracked(pid);
            }
        }

        for entry in entries {
            let reused = self.set.get_mut(entry.pid).is_some_and(|tracked| {
                tracked.record.name != entry.name || tracked.started != entry.start_time
            });
            if reused {
                // Same pid, different image or start time: numeric
                // reuse. The old identity is dropped, never merged into.
                debug!(pid = entry.pid, "pid reuse detected, replacing record");
                self.drop_tracked(entry.pid);
            }
            let in_window = self.window_contains(focus, entry.pid);
            match self.set.get_mut(entry.pid) {
                None => self.insert_new(entry),
                Some(tracked) => {
                    // Cheap per-cycle attribute refresh; CPU and memory
                    // wait for the metric window below.
                    tracked.record.responding = entry.responding;
                    tracked.record.priority = entry.priority;
                    tracked.record.parent_pid = entry.parent_pid;
                    tracked.record.category = entry.category;
                    if in_window {
                        tracked.record.memory_bytes = entry.memory_bytes;
                    }
                }
            }
        }

        let window: Vec<u32> = self
            .set
            .pids()
            .into_iter()
            .filter(|&pid| self.window_contains(focus, pid))
            .collect();
        for pid in window {
            self.sample_into_record(pid);
        }

        trace!(tracked = self.set.len(), full, "diff applied");
    }

    fn insert_new(&mut self, entry: CatalogEntry) {
        let tracker = match self.probe.open(entry.pid) {
            Ok(id) => Some(id),
            Err(err) => {
                // The record stays in the set either way; only its
                // metrics are degraded.
                debug!(pid = entry.pid, "tracker open failed: {err}");
                None
            }
        };
        let metric_available = tracker.is_some();
        if let Some(id) = tracker {
            // Prime the baseline so the next sample is meaningful.
            let _ = self.probe.sample(id);
        }
        self.set.insert(Tracked {
            record: ProcessRecord {
                pid: entry.pid,
                name: entry.name,
                parent_pid: entry.parent_pid,
                category: entry.category,
                responding: entry.responding,
                priority: entry.priority,
                cpu_percent: 0.0,
                memory_bytes: entry.memory_bytes,
                metric_available,
                first_seen: Utc::now(),
            },
            tracker,
            started: entry.start_time,
        });
    }

    fn drop_tracked(&mut self, pid: u32) {
        if let Some(tracked) = self.set.remove(pid) {
            if let Some(id) = tracked.tracker {
                self.probe.close(id);
            }
        }
    }

    fn sample_into_record(&mut self, pid: u32) {
        let Some(tracked) = self.set.get_mut(pid) else {
            return;
        };
        let Some(id) = tracked.tracker else {
            return;
        };
        match self.probe.sample(id) {
            Ok(value) => tracked.record.cpu_percent = value,
            Err(MetricError::Unavailable) => {
                // Process likely exited mid-cycle; degrade this record
                // only and let the next cycle remove it.
                debug!(pid, "utilization sample unavailable");
                tracked.record.metric_available = false;
            }
            Err(MetricError::Closed) => {
                debug!(pid, "sample on closed tracker handle");
                tracked.tracker = None;
                tracked.record.metric_available = false;
            }
        }
    }

    fn window_contains(&self, focus: &Focus, pid: u32) -> bool {
        if focus.selected == Some(pid) {
            return true;
        }
        if focus.visible.is_empty() {
            // No focus reported yet: sample the first rows in table
            // order, as a fresh UI would show them.
            return self
                .set
                .entries
                .keys()
                .take(self.tuning.metric_window)
                .any(|&candidate| candidate == pid);
        }
        focus
            .visible
            .iter()
            .take(self.tuning.metric_window)
            .any(|&candidate| candidate == pid)
    }

    fn publish(&mut self) {
        let records: Vec<ProcessRecord> = self
            .set
            .entries
            .values()
            .map(|tracked| tracked.record.clone())
            .collect();
        // Built completely before a single atomic swap: consumers never
        // see an interim set.
        self.publisher.send_replace(Arc::new(Snapshot::new(
            Utc::now(),
            records,
            self.partial_entries,
        )));
    }

    /// Releases every open tracker. Used at shutdown; close is
    /// idempotent so racing a concurrent removal is harmless.
    pub fn close_all(&mut self) {
        for pid in self.set.pids() {
            self.drop_tracked(pid);
        }
        self.publish();
    }

    /// Background loop: fixed cadence plus coalesced out-of-band
    /// refresh requests. At most one cycle is ever in flight because the
    /// loop itself is the only driver and awaits each pass to
    /// completion.
    pub async fn run_loop(
        mut self,
        interval: Duration,
        refresh: Arc<Notify>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let forced = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => false,
                _ = refresh.notified() => true,
            };
            self.run_cycle(forced).await;
        }
        debug!("reconciler stopping, releasing trackers");
        self.close_all();
    }
}
