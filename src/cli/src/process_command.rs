use crate::commands::{Cli, Commands};
use crate::render;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use taskmon_common::priority::PriorityLevel;
use taskmon_monitor::commands::RealtimeConfirm;
use taskmon_monitor::config::{ConfigLoader, MonitorConfig};
use taskmon_monitor::Monitor;

pub async fn process_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(Path::new(path))?,
        None => ConfigLoader::load_default_config()?,
    };

    match cli.command {
        Commands::List { filter, json } => list(config, filter.as_deref(), json).await,
        Commands::Watch { filter } => watch(config, filter.as_deref()).await,
        Commands::Kill { pid, tree } => kill(config, pid, tree).await,
        Commands::Priority { pid, level, yes } => priority(config, pid, &level, yes).await,
        Commands::Info { pid, json } => info(config, pid, json).await,
    }
}

/// Waits past the baseline cycle so CPU columns carry real readings.
async fn settled_monitor(config: MonitorConfig) -> Result<Monitor> {
    let monitor = Monitor::spawn(config);
    let mut rx = monitor.subscribe();
    rx.changed().await.context("monitor stopped early")?;
    monitor.request_refresh();
    rx.changed().await.context("monitor stopped early")?;
    Ok(monitor)
}

async fn list(config: MonitorConfig, filter: Option<&str>, json: bool) -> Result<()> {
    let monitor = settled_monitor(config).await?;
    let records = monitor.search(filter.unwrap_or_default());
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        render::print_table(&records);
        println!("{} processes", records.len());
    }
    monitor.shutdown().await;
    Ok(())
}

async fn watch(config: MonitorConfig, filter: Option<&str>) -> Result<()> {
    let monitor = Monitor::spawn(config);
    let mut rx = monitor.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow().clone();
                let records = taskmon_monitor::filter::filter(&snapshot, filter.unwrap_or_default());
                // home the cursor and wipe the previous frame
                print!("\x1b[2J\x1b[H");
                println!(
                    "taskmon  {}  {} processes\n",
                    snapshot.taken_at.format("%H:%M:%S"),
                    snapshot.len()
                );
                render::print_table(&records);
            }
        }
    }
    monitor.shutdown().await;
    Ok(())
}

async fn kill(config: MonitorConfig, pid: u32, tree: bool) -> Result<()> {
    let monitor = Monitor::spawn(config);
    let mut status = monitor
        .take_status_rx()
        .context("status channel already taken")?;

    let outcome = if tree {
        match monitor.terminate_tree(pid).await {
            Ok(report) => {
                for (failed, err) in &report.failures {
                    eprintln!("{}", format!("PID {failed}: {err}").red());
                }
                if report.fully_succeeded() {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!(
                        "{} of {} processes could not be terminated",
                        report.failures.len(),
                        report.attempted
                    ))
                }
            }
            Err(err) => Err(err.into()),
        }
    } else {
        monitor.terminate(pid).await.map_err(Into::into)
    };

    if let Ok(message) = status.try_recv() {
        println!("{}", message.text);
    }
    monitor.shutdown().await;
    outcome
}

async fn priority(config: MonitorConfig, pid: u32, level: &str, yes: bool) -> Result<()> {
    let level: PriorityLevel = level.parse().map_err(|err: String| anyhow::anyhow!(err))?;
    let confirm = if level == PriorityLevel::Realtime {
        if !yes && !confirm_realtime(pid)? {
            println!("Cancelled.");
            return Ok(());
        }
        RealtimeConfirm::Confirmed
    } else {
        RealtimeConfirm::Unconfirmed
    };

    let monitor = Monitor::spawn(config);
    let mut status = monitor
        .take_status_rx()
        .context("status channel already taken")?;
    let outcome = monitor.set_priority(pid, level, confirm).await;
    if let Ok(message) = status.try_recv() {
        println!("{}", message.text);
    }
    monitor.shutdown().await;
    outcome?;
    Ok(())
}

/// Realtime can starve the rest of the system, so it needs an explicit
/// yes from the user unless `--yes` was passed.
fn confirm_realtime(pid: u32) -> Result<bool> {
    print!("Set Realtime priority for PID {pid}? This can make the system unresponsive. [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn info(config: MonitorConfig, pid: u32, json: bool) -> Result<()> {
    let monitor = Monitor::spawn(config);
    let result = monitor.detail(pid).await;
    monitor.shutdown().await;
    let detail = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        render::print_detail(&detail);
    }
    Ok(())
}
