use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskmon_cli::logging::setup_logging()?;
    taskmon_cli::process_command::process_cli()
        .await
        .context("can't process CLI command")?;
    Ok(())
}
