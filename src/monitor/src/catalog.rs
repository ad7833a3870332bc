//! Catalog source: one-shot reads of live processes and their attributes.

use crate::nice;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, System};
use taskmon_common::priority::PriorityLevel;
use taskmon_common::process::{ProcessCategory, ProcessDetail, ProcessRecord};

/// Static and cheaply-refreshed attributes of one live process, as read
/// from the OS in a single pass.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub pid: u32,
    pub name: String,
    pub parent_pid: Option<u32>,
    pub category: ProcessCategory,
    pub responding: bool,
    pub priority: PriorityLevel,
    pub memory_bytes: u64,
    /// Epoch seconds the process started, 0 when unknown. Together with
    /// the pid this identifies one incarnation of a process.
    pub start_time: u64,
}

/// Result of one enumeration pass. A scan never fails as a whole;
/// entries whose attributes could not all be read are still returned
/// with defaults and counted in `partial`, so a degraded enumeration is
/// distinguishable from a clean one.
#[derive(Clone, Debug, Default)]
pub struct Scan {
    pub entries: Vec<CatalogEntry>,
    pub partial: usize,
}

/// Read access to the host process table.
///
/// Implementations must never fail a whole call because one entry is
/// inaccessible: such entries are skipped or returned with partial data.
pub trait ProcessCatalog: Send {
    /// Full scan of every live process.
    fn scan_all(&mut self) -> Scan;

    /// Re-reads only the given pids. Pids that no longer exist are
    /// simply absent from the result.
    fn probe(&mut self, pids: &[u32]) -> Scan;

    /// Scoped one-shot detail read for a properties panel. `None` when
    /// the process is gone.
    fn inspect(&mut self, pid: u32) -> Option<ProcessDetail>;
}

/// Real catalog over `sysinfo`. The `System` is shared with the
/// utilization probe and with foreground commands, so it sits behind a
/// mutex; every acquisition is scoped to a single method call.
#[derive(Clone)]
pub struct SysinfoCatalog {
    system: Arc<Mutex<System>>,
}

impl SysinfoCatalog {
    pub fn new(system: Arc<Mutex<System>>) -> Self {
        SysinfoCatalog { system }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reads one entry. The second value is false when an attribute
    /// could not be read and a default stands in for it.
    fn entry_from(process: &Process) -> (CatalogEntry, bool) {
        let pid = process.pid().as_u32();
        let nice = nice::read_nice(pid);
        let entry = CatalogEntry {
            pid,
            name: process.name().to_string(),
            parent_pid: process.parent().map(|parent| parent.as_u32()),
            category: categorize(process),
            responding: is_responding(process.status()),
            priority: nice.map(PriorityLevel::from_nice).unwrap_or_default(),
            memory_bytes: process.memory(),
            start_time: process.start_time(),
        };
        (entry, nice.is_some())
    }
}

impl ProcessCatalog for SysinfoCatalog {
    fn scan_all(&mut self) -> Scan {
        let mut system = self.system();
        system.refresh_processes_specifics(ProcessRefreshKind::everything());
        let mut scan = Scan::default();
        for process in system.processes().values() {
            let (entry, complete) = Self::entry_from(process);
            if !complete {
                scan.partial += 1;
            }
            scan.entries.push(entry);
        }
        scan
    }

    fn probe(&mut self, pids: &[u32]) -> Scan {
        let mut system = self.system();
        let kind = ProcessRefreshKind::new().with_cpu().with_memory();
        let mut scan = Scan::default();
        for &pid in pids {
            let sys_pid = Pid::from_u32(pid);
            // refresh_process_specifics reports liveness; a pid that
            // vanished since the last scan just drops out of the result.
            if !system.refresh_process_specifics(sys_pid, kind) {
                continue;
            }
            if let Some(process) = system.process(sys_pid) {
                let (entry, complete) = Self::entry_from(process);
                if !complete {
                    scan.partial += 1;
                }
                scan.entries.push(entry);
            }
        }
        scan
    }

    fn inspect(&mut self, pid: u32) -> Option<ProcessDetail> {
        let mut system = self.system();
        let sys_pid = Pid::from_u32(pid);
        if !system.refresh_process_specifics(sys_pid, ProcessRefreshKind::everything()) {
            return None;
        }
        let process = system.process(sys_pid)?;
        let (entry, _) = Self::entry_from(process);
        let started_at = start_time_utc(process.start_time());
        let uptime_secs = started_at
            .map(|start| (Utc::now() - start).num_seconds().max(0) as u64);
        Some(ProcessDetail {
            record: ProcessRecord {
                pid: entry.pid,
                name: entry.name,
                parent_pid: entry.parent_pid,
                category: entry.category,
                responding: entry.responding,
                priority: entry.priority,
                cpu_percent: process.cpu_usage().clamp(0.0, 100.0),
                memory_bytes: entry.memory_bytes,
                metric_available: true,
                first_seen: Utc::now(),
            },
            exe: process.exe().map(|path| path.to_path_buf()),
            started_at,
            uptime_secs,
        })
    }
}

fn start_time_utc(epoch_secs: u64) -> Option<DateTime<Utc>> {
    if epoch_secs == 0 {
        return None;
    }
    Utc.timestamp_opt(epoch_secs as i64, 0).single()
}

fn is_responding(status: ProcessStatus) -> bool {
    !matches!(
        status,
        ProcessStatus::Zombie
            | ProcessStatus::Stop
            | ProcessStatus::Dead
            | ProcessStatus::UninterruptibleDiskSleep
    )
}

/// Unix rendering of the original session-0 / main-window grouping:
/// root-owned processes count as System, session leaders as App,
/// everything else as Background.
fn categorize(process: &Process) -> ProcessCategory {
    let root_owned = process.user_id().map(|uid| **uid == 0).unwrap_or(false);
    if root_owned {
        ProcessCategory::System
    } else if process.session_id() == Some(process.pid()) {
        ProcessCategory::App
    } else {
        ProcessCategory::Background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SysinfoCatalog {
        SysinfoCatalog::new(Arc::new(Mutex::new(System::new())))
    }

    #[test]
    fn scan_includes_this_process() {
        let mut catalog = catalog();
        let scan = catalog.scan_all();
        let own = std::process::id();
        assert!(scan.entries.iter().any(|entry| entry.pid == own));
    }

    #[test]
    fn probe_of_dead_pid_is_absent() {
        let mut catalog = catalog();
        let own = std::process::id();
        let scan = catalog.probe(&[own, u32::MAX - 1]);
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.entries[0].pid, own);
        // a readable own process never degrades the scan
        assert_eq!(scan.partial, 0);
    }

    #[test]
    fn inspect_reads_detail_for_this_process() {
        let mut catalog = catalog();
        let detail = catalog.inspect(std::process::id()).unwrap();
        assert_eq!(detail.record.pid, std::process::id());
        assert!(!detail.record.name.is_empty());
    }

    #[test]
    fn inspect_of_dead_pid_is_none() {
        let mut catalog = catalog();
        assert!(catalog.inspect(u32::MAX - 1).is_none());
    }
}
