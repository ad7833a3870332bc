use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr so table output on stdout stays pipeable.
/// `TASKMON_LOG` selects the filter, defaulting to warnings only.
pub fn setup_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env("TASKMON_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))?;
    Ok(())
}
