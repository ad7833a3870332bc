//! Process monitoring and control.
//!
//! The [`Monitor`] facade owns a background reconciliation loop that
//! keeps an authoritative set of live processes and publishes immutable
//! snapshots. Foreground commands (terminate, tree terminate, priority)
//! go straight to the OS and request an out-of-band reconciliation; they
//! never mutate the monitored set themselves.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod filter;
pub mod mock;
mod nice;
pub mod reconciler;
pub mod tracker;

use crate::catalog::SysinfoCatalog;
use crate::commands::{
    CommandExecutor, RealtimeConfirm, SysinfoControl, TreeTerminationReport,
};
use crate::config::MonitorConfig;
use crate::reconciler::{EngineTuning, Focus, Reconciler};
use crate::tracker::SysinfoProbe;
use std::sync::{Arc, Mutex};
use sysinfo::System;
use taskmon_common::error::CommandError;
use taskmon_common::priority::PriorityLevel;
use taskmon_common::process::{ProcessDetail, ProcessRecord};
use taskmon_common::snapshot::Snapshot;
use taskmon_common::status::{StatusMessage, StatusRecorder};
use tokio::sync::{mpsc, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Handle to a running monitor. Cheap to share behind an `Arc`; all
/// methods take `&self`.
pub struct Monitor {
    snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    focus: Arc<RwLock<Focus>>,
    refresh: Arc<Notify>,
    executor: tokio::sync::Mutex<CommandExecutor<SysinfoControl, SysinfoCatalog>>,
    status_rx: Mutex<Option<mpsc::Receiver<StatusMessage>>>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Starts the reconciliation loop on the current runtime.
    pub fn spawn(config: MonitorConfig) -> Monitor {
        let system = Arc::new(Mutex::new(System::new()));
        let catalog = SysinfoCatalog::new(system.clone());
        let probe = SysinfoProbe::new(system.clone());
        let control = SysinfoControl::new(system);

        let (status, status_rx) = StatusRecorder::channel(config.status_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));
        let focus = Arc::new(RwLock::new(Focus::default()));
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let tuning = EngineTuning {
            full_scan_every: config.full_scan_every,
            metric_window: config.metric_window,
        };
        let reconciler = Reconciler::new(
            catalog.clone(),
            probe,
            snapshot_tx,
            status.clone(),
            focus.clone(),
            tuning,
        );
        let task = tokio::spawn(reconciler.run_loop(
            config.poll_interval(),
            refresh.clone(),
            cancel.clone(),
        ));
        info!(
            poll_interval_ms = config.poll_interval_ms,
            full_scan_every = config.full_scan_every,
            "monitor started"
        );

        let executor = tokio::sync::Mutex::new(CommandExecutor::new(
            control,
            catalog,
            status,
            refresh.clone(),
        ));
        Monitor {
            snapshot_rx,
            focus,
            refresh,
            executor,
            status_rx: Mutex::new(Some(status_rx)),
            cancel,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_rx.clone()
    }

    /// Filters the latest snapshot by the given query text.
    pub fn search(&self, query: &str) -> Vec<ProcessRecord> {
        filter::filter(&self.snapshot(), query)
    }

    /// Tells the engine which rows are on screen so metric sampling can
    /// stay bounded.
    pub async fn set_focus(&self, focus: Focus) {
        *self.focus.write().await = focus;
    }

    /// Requests an out-of-band full reconciliation. Requests arriving
    /// while a cycle is in flight coalesce into one.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    pub async fn terminate(&self, pid: u32) -> Result<(), CommandError> {
        self.executor.lock().await.terminate(pid)
    }

    pub async fn terminate_tree(&self, pid: u32) -> Result<TreeTerminationReport, CommandError> {
        self.executor.lock().await.terminate_tree(pid)
    }

    pub async fn set_priority(
        &self,
        pid: u32,
        level: PriorityLevel,
        confirm: RealtimeConfirm,
    ) -> Result<(), CommandError> {
        self.executor.lock().await.set_priority(pid, level, confirm)
    }

    /// One-shot detail read, independent of the snapshot cadence.
    pub async fn detail(&self, pid: u32) -> Result<ProcessDetail, CommandError> {
        self.executor.lock().await.detail(pid)
    }

    /// Hands out the status-line receiver. Returns `None` after the
    /// first call; there is exactly one consumer.
    pub fn take_status_rx(&self) -> Option<mpsc::Receiver<StatusMessage>> {
        match self.status_rx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Stops the loop and waits for every tracker to be released.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
        info!("monitor stopped");
    }
}
