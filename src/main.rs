//! Hyperdrive Sim — Entry Point
//!
//! Runs one simulation described by a TOML file to completion.
//!
//! Wiring sequence:
//! 1. Load config (first CLI argument, default `config.toml`) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Open the JSONL repository under the configured data directory
//! 4. Build the market, seed it with the LP's liquidity, replay trades
//! 5. Persist the terminal snapshot and log the report

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use tracing::info;

use hyperdrive_sim::adapters::persistence::RepositoryImpl;
use hyperdrive_sim::config;
use hyperdrive_sim::usecases::Simulation;

fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.simulation.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.simulation.name,
        version = env!("CARGO_PKG_VERSION"),
        pricing_model = %config.market.pricing_model,
        blocks = config.simulation.total_blocks(),
        trades = config.trades.len(),
        "Starting Hyperdrive simulation"
    );

    // ── 3. Open output repository ───────────────────────────
    let repo = RepositoryImpl::from_data_dir(
        &config.simulation.data_dir,
        &config.simulation.name,
    )
    .context("Failed to open data directory")?;

    // ── 4. Build, seed and run ──────────────────────────────
    let mut simulation = Simulation::from_config(&config, repo)
        .context("Failed to build simulation")?;
    let report = simulation.run()?;

    info!(
        name = %report.name,
        blocks = report.blocks,
        final_block_time = report.final_block_time,
        succeeded = report.trades_succeeded,
        failed = report.trades_failed,
        fixed_apr = ?report.fixed_apr,
        spot_price = ?report.spot_price,
        share_price = %report.share_price,
        "Simulation complete"
    );
    Ok(())
}
