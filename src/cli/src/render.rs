//! Table and detail rendering for stdout.

use colored::Colorize;
use taskmon_common::process::{format_bytes, ProcessDetail, ProcessRecord};

const NAME_WIDTH: usize = 28;

fn row(record: &ProcessRecord) -> String {
    let cpu = if record.metric_available {
        format!("{:.1}", record.cpu_percent)
    } else {
        "-".to_string()
    };
    format!(
        "{:<8} {:<width$} {:>6} {:>10} {:<13} {:<15} {}",
        record.pid,
        truncate(&record.name, NAME_WIDTH),
        cpu,
        format_bytes(record.memory_bytes),
        record.priority.label(),
        record.status_label(),
        record.category.label(),
        width = NAME_WIDTH,
    )
}

pub fn print_table(records: &[ProcessRecord]) {
    let header = format!(
        "{:<8} {:<width$} {:>6} {:>10} {:<13} {:<15} {}",
        "PID",
        "NAME",
        "CPU%",
        "MEMORY",
        "PRIORITY",
        "STATUS",
        "CATEGORY",
        width = NAME_WIDTH,
    );
    println!("{}", header.bold());
    for record in records {
        if record.responding {
            println!("{}", row(record));
        } else {
            println!("{}", row(record).red());
        }
    }
}

pub fn print_detail(detail: &ProcessDetail) {
    let record = &detail.record;
    println!(
        "{} (PID: {})",
        record.name.bold(),
        record.pid
    );
    println!("  Status:    {}", record.status_label());
    println!("  Category:  {}", record.category.label());
    println!("  Priority:  {}", record.priority.label());
    if let Some(parent) = record.parent_pid {
        println!("  Parent:    {parent}");
    }
    if let Some(exe) = &detail.exe {
        println!("  Exe:       {}", exe.display());
    }
    println!("  CPU:       {:.1}%", record.cpu_percent);
    println!("  Memory:    {}", format_bytes(record.memory_bytes));
    if let Some(started) = detail.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(uptime) = detail.uptime_secs {
        println!("  Uptime:    {}", format_uptime(uptime));
    }
}

fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        name.to_string()
    } else {
        let cut: String = name.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn format_uptime(secs: u64) -> String {
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_names_with_ellipsis() {
        assert_eq!(truncate("short", 28), "short");
        let long = "a".repeat(40);
        let out = truncate(&long, 28);
        assert_eq!(out.chars().count(), 28);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 05s");
        assert_eq!(format_uptime(3723), "1h 02m 03s");
    }
}
