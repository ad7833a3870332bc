//! User-initiated process commands: terminate, tree terminate, priority.

use crate::catalog::ProcessCatalog;
use crate::nice;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::{Pid, ProcessRefreshKind, System};
use taskmon_common::error::CommandError;
use taskmon_common::priority::PriorityLevel;
use taskmon_common::process::ProcessDetail;
use taskmon_common::status::StatusRecorder;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// OS-level process control. Kept behind a trait so command logic can be
/// exercised against a scripted double.
pub trait ProcessControl: Send {
    fn kill(&mut self, pid: u32) -> Result<(), CommandError>;
    fn set_priority(&mut self, pid: u32, level: PriorityLevel) -> Result<(), CommandError>;
}

/// Real control over the shared `sysinfo::System` plus libc setpriority.
pub struct SysinfoControl {
    system: Arc<Mutex<System>>,
}

impl SysinfoControl {
    pub fn new(system: Arc<Mutex<System>>) -> Self {
        SysinfoControl { system }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ProcessControl for SysinfoControl {
    fn kill(&mut self, pid: u32) -> Result<(), CommandError> {
        let mut system = self.system();
        let sys_pid = Pid::from_u32(pid);
        if !system.refresh_process_specifics(sys_pid, ProcessRefreshKind::new()) {
            return Err(CommandError::ProcessNotFound(pid));
        }
        let process = system
            .process(sys_pid)
            .ok_or(CommandError::ProcessNotFound(pid))?;
        if process.kill() {
            Ok(())
        } else {
            Err(CommandError::AccessDenied(pid))
        }
    }

    fn set_priority(&mut self, pid: u32, level: PriorityLevel) -> Result<(), CommandError> {
        nice::write_nice(pid, level.to_nice()).map_err(|err| match err.raw_os_error() {
            Some(libc::ESRCH) => CommandError::ProcessNotFound(pid),
            Some(libc::EPERM) | Some(libc::EACCES) => CommandError::AccessDenied(pid),
            _ => CommandError::Unsupported(format!("setpriority({pid}): {err}")),
        })
    }
}

/// Confirmation token for the Realtime priority gate. The gate is part
/// of the command contract, not a UI nicety: callers must have asked the
/// user before passing `Confirmed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealtimeConfirm {
    Unconfirmed,
    Confirmed,
}

/// Outcome of a tree termination. Termination is irreversible, so a
/// partial failure reports what happened without undoing prior kills.
#[derive(Clone, Debug, Default)]
pub struct TreeTerminationReport {
    /// Kill calls issued (descendants plus the root).
    pub attempted: usize,
    pub killed: usize,
    /// Pids that vanished between enumeration and the kill attempt.
    pub vanished: Vec<u32>,
    /// Real failures, e.g. access denied on one survivor.
    pub failures: Vec<(u32, CommandError)>,
}

impl TreeTerminationReport {
    pub fn fully_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Executes foreground commands against the OS and reports back through
/// the status channel. Successful mutations request an out-of-band
/// reconciliation instead of touching the monitor set directly; the
/// reconciler stays the single writer.
pub struct CommandExecutor<K, C> {
    control: K,
    catalog: C,
    status: StatusRecorder,
    refresh: Arc<Notify>,
}

impl<K: ProcessControl, C: ProcessCatalog> CommandExecutor<K, C> {
    pub fn new(control: K, catalog: C, status: StatusRecorder, refresh: Arc<Notify>) -> Self {
        CommandExecutor {
            control,
            catalog,
            status,
            refresh,
        }
    }

    /// Forced termination of a single process.
    pub fn terminate(&mut self, pid: u32) -> Result<(), CommandError> {
        let name = self.display_name(pid);
        self.control.kill(pid)?;
        self.status
            .push(format!("Process {name} (PID: {pid}) terminated"));
        self.refresh.notify_one();
        Ok(())
    }

    /// Terminates `pid` and every reachable descendant, children first.
    ///
    /// The tree is enumerated over a fresh catalog read; every step is
    /// best-effort because a child list can be stale by the time it is
    /// acted on. Returns `ProcessNotFound` only when the root itself is
    /// already gone.
    pub fn terminate_tree(&mut self, pid: u32) -> Result<TreeTerminationReport, CommandError> {
        let entries = self.catalog.scan_all().entries;
        // The name has to come from this scan: once the root is killed
        // a fresh read would find nothing to name.
        let name = entries
            .iter()
            .find(|entry| entry.pid == pid)
            .map(|entry| entry.name.clone())
            .ok_or(CommandError::ProcessNotFound(pid))?;

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in &entries {
            if let Some(parent) = entry.parent_pid {
                children.entry(parent).or_default().push(entry.pid);
            }
        }

        let order = kill_order(pid, &children);
        let mut report = TreeTerminationReport::default();
        for target in order {
            report.attempted += 1;
            match self.control.kill(target) {
                Ok(()) => report.killed += 1,
                Err(CommandError::ProcessNotFound(_)) => {
                    debug!("pid {target} vanished before tree kill reached it");
                    report.vanished.push(target);
                }
                Err(err) => {
                    warn!("tree kill of {target} failed: {err}");
                    report.failures.push((target, err));
                }
            }
        }

        if report.fully_succeeded() {
            self.status
                .push(format!("Process tree for {name} (PID: {pid}) terminated"));
        } else {
            self.status.push(format!(
                "Process tree for {name} (PID: {pid}): {} of {} terminated",
                report.killed, report.attempted
            ));
        }
        self.refresh.notify_one();
        Ok(report)
    }

    /// Changes scheduling priority. On success the affected record's
    /// priority is re-read from the OS on the refresh this triggers,
    /// never assumed from the request.
    pub fn set_priority(
        &mut self,
        pid: u32,
        level: PriorityLevel,
        confirm: RealtimeConfirm,
    ) -> Result<(), CommandError> {
        if level == PriorityLevel::Realtime && confirm != RealtimeConfirm::Confirmed {
            return Err(CommandError::RealtimeNotConfirmed);
        }
        self.control.set_priority(pid, level)?;
        let observed = self
            .catalog
            .probe(&[pid])
            .entries
            .into_iter()
            .next()
            .map(|entry| entry.priority)
            .unwrap_or(level);
        let name = self.display_name(pid);
        self.status.push(format!(
            "Changed priority of {name} (PID: {pid}) to {observed}"
        ));
        self.refresh.notify_one();
        Ok(())
    }

    /// One-shot detail read for a properties panel.
    pub fn detail(&mut self, pid: u32) -> Result<ProcessDetail, CommandError> {
        self.catalog
            .inspect(pid)
            .ok_or(CommandError::ProcessNotFound(pid))
    }

    fn display_name(&mut self, pid: u32) -> String {
        self.catalog
            .probe(&[pid])
            .entries
            .into_iter()
            .next()
            .map(|entry| entry.name)
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Post-order walk of the subtree rooted at `root`: children strictly
/// before their ancestors, the root last. A visited set guards against a
/// malformed parent chain looping the walk.
fn kill_order(root: u32, children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    walk(root, children, &mut visited, &mut order);
    order
}

fn walk(
    pid: u32,
    children: &HashMap<u32, Vec<u32>>,
    visited: &mut HashSet<u32>,
    order: &mut Vec<u32>,
) {
    if !visited.insert(pid) {
        return;
    }
    if let Some(kids) = children.get(&pid) {
        for &kid in kids {
            walk(kid, children, visited, order);
        }
    }
    order.push(pid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCatalog, MockControl};

    fn executor(
        catalog: &MockCatalog,
        control: &MockControl,
    ) -> CommandExecutor<MockControl, MockCatalog> {
        let (status, _rx) = StatusRecorder::channel(64);
        CommandExecutor::new(control.clone(), catalog.clone(), status, Arc::new(Notify::new()))
    }

    #[test]
    fn terminate_tree_kills_children_first_and_spares_siblings() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(100, "A"));
        catalog.add(MockCatalog::child(200, "B", 100));
        catalog.add(MockCatalog::entry(300, "C"));
        let control = MockControl::new();

        let report = executor(&catalog, &control).terminate_tree(100).unwrap();

        assert_eq!(control.kill_journal(), vec![200, 100]);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.killed, 2);
        assert!(report.fully_succeeded());
    }

    #[test]
    fn terminate_tree_issues_one_call_per_node_descendants_first() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(1, "root"));
        catalog.add(MockCatalog::child(10, "a", 1));
        catalog.add(MockCatalog::child(11, "b", 1));
        catalog.add(MockCatalog::child(100, "a1", 10));
        catalog.add(MockCatalog::child(101, "a2", 10));
        let control = MockControl::new();

        let report = executor(&catalog, &control).terminate_tree(1).unwrap();
        let journal = control.kill_journal();

        assert_eq!(report.attempted, 5);
        assert_eq!(journal.len(), 5);
        let position = |pid: u32| journal.iter().position(|&p| p == pid).unwrap();
        assert!(position(100) < position(10));
        assert!(position(101) < position(10));
        assert!(position(10) < position(1));
        assert!(position(11) < position(1));
    }

    #[test]
    fn tree_status_line_names_the_root_after_it_is_gone() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(100, "A"));
        catalog.add(MockCatalog::child(200, "B", 100));
        // a successful kill removes the pid from the table, so the name
        // must have been captured before the kills
        let control = MockControl::backed_by(&catalog);
        let (status, mut rx) = StatusRecorder::channel(8);
        let mut executor = CommandExecutor::new(
            control.clone(),
            catalog.clone(),
            status,
            Arc::new(Notify::new()),
        );

        executor.terminate_tree(100).unwrap();

        assert!(catalog.is_empty());
        let message = rx.try_recv().unwrap();
        assert!(message.text.contains("A"));
        assert!(message.text.contains("100"));
        assert!(!message.text.contains('?'));
    }

    #[test]
    fn terminate_tree_skips_vanished_children() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(1, "root"));
        catalog.add(MockCatalog::child(2, "gone", 1));
        let control = MockControl::new();
        control.vanish(2);

        let report = executor(&catalog, &control).terminate_tree(1).unwrap();

        assert_eq!(report.vanished, vec![2]);
        assert_eq!(report.killed, 1);
        assert!(report.fully_succeeded());
        assert_eq!(control.kill_journal(), vec![2, 1]);
    }

    #[test]
    fn terminate_tree_reports_partial_failure_without_rollback() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(1, "root"));
        catalog.add(MockCatalog::child(2, "stubborn", 1));
        let control = MockControl::new();
        control.deny(2);

        let report = executor(&catalog, &control).terminate_tree(1).unwrap();

        assert_eq!(report.failures, vec![(2, CommandError::AccessDenied(2))]);
        // the root kill still happened; nothing is undone
        assert_eq!(report.killed, 1);
        assert_eq!(control.kill_journal(), vec![2, 1]);
    }

    #[test]
    fn terminate_tree_of_missing_root_is_not_found() {
        let catalog = MockCatalog::new();
        let control = MockControl::new();
        assert_eq!(
            executor(&catalog, &control).terminate_tree(9).unwrap_err(),
            CommandError::ProcessNotFound(9)
        );
        assert!(control.kill_journal().is_empty());
    }

    #[test]
    fn realtime_requires_confirmation() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(5, "svc"));
        let control = MockControl::new();
        let mut executor = executor(&catalog, &control);

        assert_eq!(
            executor.set_priority(5, PriorityLevel::Realtime, RealtimeConfirm::Unconfirmed),
            Err(CommandError::RealtimeNotConfirmed)
        );
        assert!(control.priority_of(5).is_none());

        executor
            .set_priority(5, PriorityLevel::Realtime, RealtimeConfirm::Confirmed)
            .unwrap();
        assert_eq!(control.priority_of(5), Some(PriorityLevel::Realtime));
    }

    #[test]
    fn non_realtime_levels_need_no_confirmation() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(5, "svc"));
        let control = MockControl::new();

        executor(&catalog, &control)
            .set_priority(5, PriorityLevel::High, RealtimeConfirm::Unconfirmed)
            .unwrap();
        assert_eq!(control.priority_of(5), Some(PriorityLevel::High));
    }

    #[test]
    fn priority_denial_is_distinct_from_not_found() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(5, "svc"));
        let control = MockControl::new();
        control.deny(5);
        let mut executor = executor(&catalog, &control);

        assert_eq!(
            executor.set_priority(5, PriorityLevel::Idle, RealtimeConfirm::Unconfirmed),
            Err(CommandError::AccessDenied(5))
        );
        control.vanish(77);
        assert_eq!(
            executor.terminate(77),
            Err(CommandError::ProcessNotFound(77))
        );
    }

    #[test]
    fn terminate_failure_leaves_no_status_side_effects() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(8, "locked"));
        let control = MockControl::new();
        control.deny(8);
        let (status, mut rx) = StatusRecorder::channel(8);
        let mut executor = CommandExecutor::new(
            control.clone(),
            catalog.clone(),
            status,
            Arc::new(Notify::new()),
        );

        assert!(executor.terminate(8).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detail_of_live_process_reads_through() {
        let catalog = MockCatalog::new();
        catalog.add(MockCatalog::entry(3, "worker"));
        let control = MockControl::new();

        let detail = executor(&catalog, &control).detail(3).unwrap();
        assert_eq!(detail.record.pid, 3);
        assert_eq!(detail.record.name, "worker");
    }
}
