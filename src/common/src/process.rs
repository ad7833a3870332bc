use crate::priority::PriorityLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Coarse classification of a process, mirroring what a task-manager UI
/// groups by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessCategory {
    System,
    App,
    Background,
}

impl ProcessCategory {
    pub fn label(self) -> &'static str {
        match self {
            ProcessCategory::System => "System",
            ProcessCategory::App => "App",
            ProcessCategory::Background => "Background",
        }
    }
}

impl fmt::Display for ProcessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One monitored process as published to consumers.
///
/// A record keeps a stable identity across reconciliation cycles: fields
/// are updated in place while the pid stays alive. A pid that disappears
/// and later comes back (numeric reuse) produces a brand-new record with
/// a fresh `first_seen`; the two are never merged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub parent_pid: Option<u32>,
    pub category: ProcessCategory,
    pub responding: bool,
    pub priority: PriorityLevel,
    /// CPU utilization as percent of one core, in [0, 100]. Meaningful
    /// only once the tracker has moved past its baseline sample.
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    /// False when the sampling backend refused to attach; the record
    /// stays in the set regardless.
    pub metric_available: bool,
    pub first_seen: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn status_label(&self) -> &'static str {
        if self.responding {
            "Running"
        } else {
            "Not responding"
        }
    }
}

/// One-shot detail view of a single process, read on demand for a
/// properties panel. All reads happen inside a single scoped acquisition
/// so a failure path cannot leak an OS handle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessDetail {
    pub record: ProcessRecord,
    pub exe: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<u64>,
}

/// Formats a byte count the way the process table displays memory.
pub fn format_bytes(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut idx = 0;
    while size >= 1024.0 && idx < SUFFIXES.len() - 1 {
        size /= 1024.0;
        idx += 1;
    }
    format!("{size:.1} {}", SUFFIXES[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_scales() {
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn status_label_follows_responding() {
        let mut record = ProcessRecord {
            pid: 1,
            name: "init".into(),
            parent_pid: None,
            category: ProcessCategory::System,
            responding: true,
            priority: PriorityLevel::Normal,
            cpu_percent: 0.0,
            memory_bytes: 0,
            metric_available: true,
            first_seen: Utc::now(),
        };
        assert_eq!(record.status_label(), "Running");
        record.responding = false;
        assert_eq!(record.status_label(), "Not responding");
    }
}
