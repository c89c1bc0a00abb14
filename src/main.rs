//! Headless Quantro runner (default binary).
//!
//! Plays one game with the built-in autoplayer, optionally writing periodic
//! checkpoints, and prints a JSON summary on stdout. Configuration comes from
//! `QUANTRO_*` environment variables; logging from `RUST_LOG`.

use anyhow::{Context, Result};

use quantro::driver::{run, DriverConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = DriverConfig::from_env();
    tracing::info!(
        target: "quantro::driver",
        rows = config.rows,
        cols = config.cols,
        seed = config.seed,
        ticks = config.ticks,
        "starting run"
    );

    let summary = run(config).await?;
    let json = serde_json::to_string_pretty(&summary).context("failed to encode summary")?;
    println!("{}", json);
    Ok(())
}
