//! Monitor configuration, layered defaults-first with an optional TOML
//! file on top.

use anyhow::{Context, Result};
use config::{Config as RConfig, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const POLL_INTERVAL_MS: u64 = 1000;
const FULL_SCAN_EVERY: u32 = 5;
const METRIC_WINDOW: usize = 50;
const STATUS_CAPACITY: usize = 64;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Reconciliation cadence.
    pub poll_interval_ms: u64,
    /// Every Nth cycle re-scans the whole process table instead of only
    /// the tracked pids.
    pub full_scan_every: u32,
    /// Cap on rows whose metrics are refreshed per cycle when no focus
    /// is reported.
    pub metric_window: usize,
    /// Bound of the status-line channel; overflow drops, never blocks.
    pub status_capacity: usize,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            poll_interval_ms: POLL_INTERVAL_MS,
            full_scan_every: FULL_SCAN_EVERY,
            metric_window: METRIC_WINDOW,
            status_capacity: STATUS_CAPACITY,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = RConfig::builder()
            .set_default("poll_interval_ms", POLL_INTERVAL_MS)?
            .set_default("full_scan_every", FULL_SCAN_EVERY)?
            .set_default("metric_window", METRIC_WINDOW as u64)?
            .set_default("status_capacity", STATUS_CAPACITY as u64)?;
        Ok(builder)
    }

    pub fn load_default_config() -> Result<MonitorConfig> {
        Self::defaults()?
            .build()?
            .try_deserialize()
            .context("failed to assemble default config")
    }

    /// Defaults overlaid with a TOML file; keys absent from the file
    /// keep their default values.
    pub fn load_from_file(path: &Path) -> Result<MonitorConfig> {
        Self::defaults()?
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load() {
        let config = ConfigLoader::load_default_config().unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.full_scan_every, 5);
        assert_eq!(config.metric_window, 50);
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn file_overrides_defaults_and_keeps_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = 250\nfull_scan_every = 3").unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.full_scan_every, 3);
        assert_eq!(config.metric_window, 50);
        assert_eq!(config.status_capacity, 64);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = \"soon\"").unwrap();
        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }
}
