//! Scripted doubles for the OS-facing seams.
//!
//! Shipped as a regular module so both unit tests and the integration
//! tests can drive the reconciler and command executor against a fully
//! controlled process table. Every double is `Clone` with shared
//! interior state: tests keep one handle to mutate the simulated world
//! while the engine owns the other.

use crate::catalog::{CatalogEntry, ProcessCatalog, Scan};
use crate::commands::ProcessControl;
use crate::tracker::{TrackerId, UtilizationProbe};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use taskmon_common::error::{CommandError, MetricError};
use taskmon_common::priority::PriorityLevel;
use taskmon_common::process::{ProcessCategory, ProcessDetail, ProcessRecord};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct CatalogState {
    table: BTreeMap<u32, CatalogEntry>,
    partial: usize,
}

/// In-memory process table.
#[derive(Clone, Default)]
pub struct MockCatalog {
    inner: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(pid: u32, name: &str) -> CatalogEntry {
        CatalogEntry {
            pid,
            name: name.to_string(),
            parent_pid: None,
            category: ProcessCategory::Background,
            responding: true,
            priority: PriorityLevel::Normal,
            memory_bytes: 1024 * 1024,
            start_time: 1_700_000_000,
        }
    }

    pub fn child(pid: u32, name: &str, parent: u32) -> CatalogEntry {
        CatalogEntry {
            parent_pid: Some(parent),
            ..Self::entry(pid, name)
        }
    }

    pub fn add(&self, entry: CatalogEntry) {
        lock(&self.inner).table.insert(entry.pid, entry);
    }

    pub fn remove(&self, pid: u32) {
        lock(&self.inner).table.remove(&pid);
    }

    pub fn set_priority(&self, pid: u32, priority: PriorityLevel) {
        if let Some(entry) = lock(&self.inner).table.get_mut(&pid) {
            entry.priority = priority;
        }
    }

    pub fn set_responding(&self, pid: u32, responding: bool) {
        if let Some(entry) = lock(&self.inner).table.get_mut(&pid) {
            entry.responding = responding;
        }
    }

    /// Scripts the number of unreadable entries every full scan reports.
    pub fn set_partial(&self, partial: usize) {
        lock(&self.inner).partial = partial;
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).table.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).table.is_empty()
    }
}

impl ProcessCatalog for MockCatalog {
    fn scan_all(&mut self) -> Scan {
        let inner = lock(&self.inner);
        Scan {
            entries: inner.table.values().cloned().collect(),
            partial: inner.partial,
        }
    }

    fn probe(&mut self, pids: &[u32]) -> Scan {
        let inner = lock(&self.inner);
        Scan {
            entries: pids
                .iter()
                .filter_map(|pid| inner.table.get(pid).cloned())
                .collect(),
            partial: 0,
        }
    }

    fn inspect(&mut self, pid: u32) -> Option<ProcessDetail> {
        let entry = lock(&self.inner).table.get(&pid).cloned()?;
        Some(ProcessDetail {
            record: ProcessRecord {
                pid: entry.pid,
                name: entry.name,
                parent_pid: entry.parent_pid,
                category: entry.category,
                responding: entry.responding,
                priority: entry.priority,
                cpu_percent: 0.0,
                memory_bytes: entry.memory_bytes,
                metric_available: true,
                first_seen: Utc::now(),
            },
            exe: None,
            started_at: None,
            uptime_secs: None,
        })
    }
}

struct ProbeState {
    next_id: u64,
    slots: HashMap<TrackerId, (u32, bool)>,
    unavailable: HashSet<u32>,
    load: HashMap<u32, f32>,
    samples: HashMap<u32, usize>,
    opened: Vec<u32>,
    closed: Vec<u32>,
}

/// Scripted utilization probe: first sample per open handle is the 0.0
/// baseline, later samples return the configured per-pid load. Keeps
/// journals of opens, closes and sample counts for assertions.
#[derive(Clone)]
pub struct MockProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl Default for MockProbe {
    fn default() -> Self {
        MockProbe {
            inner: Arc::new(Mutex::new(ProbeState {
                next_id: 0,
                slots: HashMap::new(),
                unavailable: HashSet::new(),
                load: HashMap::new(),
                samples: HashMap::new(),
                opened: Vec::new(),
                closed: Vec::new(),
            })),
        }
    }
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open(pid)` fail with `Unavailable`.
    pub fn refuse(&self, pid: u32) {
        lock(&self.inner).unavailable.insert(pid);
    }

    /// Sets the utilization reported once the baseline has been taken.
    pub fn set_load(&self, pid: u32, percent: f32) {
        lock(&self.inner).load.insert(pid, percent);
    }

    pub fn sample_count(&self, pid: u32) -> usize {
        lock(&self.inner).samples.get(&pid).copied().unwrap_or(0)
    }

    pub fn open_pids(&self) -> Vec<u32> {
        let inner = lock(&self.inner);
        inner.slots.values().map(|&(pid, _)| pid).collect()
    }

    pub fn opened_journal(&self) -> Vec<u32> {
        lock(&self.inner).opened.clone()
    }

    pub fn closed_journal(&self) -> Vec<u32> {
        lock(&self.inner).closed.clone()
    }
}

impl UtilizationProbe for MockProbe {
    fn open(&mut self, pid: u32) -> Result<TrackerId, MetricError> {
        let mut inner = lock(&self.inner);
        if inner.unavailable.contains(&pid) {
            return Err(MetricError::Unavailable);
        }
        let id = TrackerId::from_raw(inner.next_id);
        inner.next_id += 1;
        inner.slots.insert(id, (pid, false));
        inner.opened.push(pid);
        Ok(id)
    }

    fn sample(&mut self, id: TrackerId) -> Result<f32, MetricError> {
        let mut inner = lock(&self.inner);
        let (pid, baselined) = *inner.slots.get(&id).ok_or(MetricError::Closed)?;
        *inner.samples.entry(pid).or_insert(0) += 1;
        if !baselined {
            inner.slots.insert(id, (pid, true));
            return Ok(0.0);
        }
        Ok(inner.load.get(&pid).copied().unwrap_or(1.0))
    }

    fn close(&mut self, id: TrackerId) {
        let mut inner = lock(&self.inner);
        if let Some((pid, _)) = inner.slots.remove(&id) {
            inner.closed.push(pid);
        }
    }
}

struct ControlState {
    kills: Vec<u32>,
    missing: HashSet<u32>,
    denied: HashSet<u32>,
    priorities: HashMap<u32, PriorityLevel>,
}

/// Scripted process control recording every kill attempt in call order.
#[derive(Clone)]
pub struct MockControl {
    inner: Arc<Mutex<ControlState>>,
    catalog: Option<MockCatalog>,
}

impl Default for MockControl {
    fn default() -> Self {
        MockControl {
            inner: Arc::new(Mutex::new(ControlState {
                kills: Vec::new(),
                missing: HashSet::new(),
                denied: HashSet::new(),
                priorities: HashMap::new(),
            })),
            catalog: None,
        }
    }
}

impl MockControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Control wired to a catalog: a successful kill removes the pid
    /// from the table, the way a real kill makes the process disappear
    /// from subsequent reads.
    pub fn backed_by(catalog: &MockCatalog) -> Self {
        MockControl {
            catalog: Some(catalog.clone()),
            ..Self::default()
        }
    }

    /// Makes commands against `pid` fail with `ProcessNotFound`.
    pub fn vanish(&self, pid: u32) {
        lock(&self.inner).missing.insert(pid);
    }

    /// Makes commands against `pid` fail with `AccessDenied`.
    pub fn deny(&self, pid: u32) {
        lock(&self.inner).denied.insert(pid);
    }

    /// Every kill attempt in the order it was issued, including refused
    /// ones.
    pub fn kill_journal(&self) -> Vec<u32> {
        lock(&self.inner).kills.clone()
    }

    pub fn priority_of(&self, pid: u32) -> Option<PriorityLevel> {
        lock(&self.inner).priorities.get(&pid).copied()
    }
}

impl ProcessControl for MockControl {
    fn kill(&mut self, pid: u32) -> Result<(), CommandError> {
        {
            let mut inner = lock(&self.inner);
            inner.kills.push(pid);
            if inner.missing.contains(&pid) {
                return Err(CommandError::ProcessNotFound(pid));
            }
            if inner.denied.contains(&pid) {
                return Err(CommandError::AccessDenied(pid));
            }
        }
        if let Some(catalog) = &self.catalog {
            catalog.remove(pid);
        }
        Ok(())
    }

    fn set_priority(&mut self, pid: u32, level: PriorityLevel) -> Result<(), CommandError> {
        let mut inner = lock(&self.inner);
        if inner.missing.contains(&pid) {
            return Err(CommandError::ProcessNotFound(pid));
        }
        if inner.denied.contains(&pid) {
            return Err(CommandError::AccessDenied(pid));
        }
        inner.priorities.insert(pid, level);
        Ok(())
    }
}
