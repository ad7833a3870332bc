//! Per-process utilization trackers.
//!
//! A tracker is a live OS-side sampling registration: the first sample
//! after opening establishes a baseline and reports 0.0, later samples
//! report usage since the previous call. Handles are keyed so the owner
//! can hold exactly one per pid and release it exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::{Pid, ProcessRefreshKind, System};
use taskmon_common::error::MetricError;

/// Opaque handle to one open tracker. Ids are never reused within a
/// probe's lifetime, so a stale handle can always be told apart from a
/// live one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackerId(u64);

impl TrackerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        TrackerId(raw)
    }
}

/// Utilization sampling backend. One open registration per tracked pid;
/// close is idempotent and a closed handle never yields another sample.
pub trait UtilizationProbe: Send {
    fn open(&mut self, pid: u32) -> Result<TrackerId, MetricError>;

    /// CPU utilization in [0, 100] percent of one core. The first call
    /// after `open` returns the 0.0 baseline, not a meaningful reading.
    fn sample(&mut self, id: TrackerId) -> Result<f32, MetricError>;

    fn close(&mut self, id: TrackerId);
}

struct TrackerSlot {
    pid: u32,
    baselined: bool,
}

/// Real probe over the shared `sysinfo::System`. The per-pid refresh is
/// what advances sysinfo's internal CPU-time delta, so each sample call
/// maps to one targeted refresh.
pub struct SysinfoProbe {
    system: Arc<Mutex<System>>,
    next_id: u64,
    open: HashMap<TrackerId, TrackerSlot>,
}

impl SysinfoProbe {
    pub fn new(system: Arc<Mutex<System>>) -> Self {
        SysinfoProbe {
            system,
            next_id: 0,
            open: HashMap::new(),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn refresh(system: &mut System, pid: u32) -> bool {
        system.refresh_process_specifics(Pid::from_u32(pid), ProcessRefreshKind::new().with_cpu())
    }
}

impl UtilizationProbe for SysinfoProbe {
    fn open(&mut self, pid: u32) -> Result<TrackerId, MetricError> {
        {
            let mut system = self.system();
            if !Self::refresh(&mut system, pid) {
                return Err(MetricError::Unavailable);
            }
        }
        let id = TrackerId::from_raw(self.next_id);
        self.next_id += 1;
        self.open.insert(
            id,
            TrackerSlot {
                pid,
                baselined: false,
            },
        );
        Ok(id)
    }

    fn sample(&mut self, id: TrackerId) -> Result<f32, MetricError> {
        let slot = self.open.get(&id).ok_or(MetricError::Closed)?;
        let (pid, baselined) = (slot.pid, slot.baselined);
        let usage = {
            let mut system = self.system();
            if !Self::refresh(&mut system, pid) {
                return Err(MetricError::Unavailable);
            }
            system
                .process(Pid::from_u32(pid))
                .map(|process| process.cpu_usage())
        };
        if !baselined {
            if let Some(slot) = self.open.get_mut(&id) {
                slot.baselined = true;
            }
            return Ok(0.0);
        }
        let usage = usage.ok_or(MetricError::Unavailable)?;
        Ok(usage.clamp(0.0, 100.0))
    }

    fn close(&mut self, id: TrackerId) {
        // Removing an unknown id is the idempotent-close no-op.
        self.open.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> SysinfoProbe {
        SysinfoProbe::new(Arc::new(Mutex::new(System::new())))
    }

    #[test]
    fn first_sample_is_baseline() {
        let mut probe = probe();
        let id = probe.open(std::process::id()).unwrap();
        assert_eq!(probe.sample(id).unwrap(), 0.0);
    }

    #[test]
    fn second_sample_reports_utilization() {
        let mut probe = probe();
        let id = probe.open(std::process::id()).unwrap();
        assert_eq!(probe.sample(id).unwrap(), 0.0);
        let usage = probe.sample(id).unwrap();
        assert!((0.0..=100.0).contains(&usage));
    }

    #[test]
    fn open_of_dead_pid_is_unavailable() {
        let mut probe = probe();
        assert_eq!(probe.open(u32::MAX - 1), Err(MetricError::Unavailable));
    }

    #[test]
    fn closed_tracker_never_samples_again() {
        let mut probe = probe();
        let id = probe.open(std::process::id()).unwrap();
        probe.close(id);
        probe.close(id); // double close is a no-op
        assert_eq!(probe.sample(id), Err(MetricError::Closed));
    }

    #[test]
    fn handles_are_not_reused_across_reopen() {
        let mut probe = probe();
        let first = probe.open(std::process::id()).unwrap();
        probe.close(first);
        let second = probe.open(std::process::id()).unwrap();
        assert_ne!(first, second);
    }
}
