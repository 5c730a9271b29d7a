use std::time::Duration;

use clap::Args;
use tracing::info;

use super::{open_engine, CliResult};

#[derive(Args)]
pub struct DaemonArgs {
    /// Seconds between sweeps (default: sweep.interval_secs)
    #[arg(long)]
    interval_secs: Option<u64>,
}

pub fn run(args: DaemonArgs) -> CliResult {
    let (engine, config) = open_engine()?;
    let every = args
        .interval_secs
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.sweep.interval());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        info!(interval_secs = every.as_secs(), "sweep daemon started");
        let handle = engine.sweeper().spawn_periodic(every);
        let signal = tokio::signal::ctrl_c().await;
        handle.shutdown().await;
        info!("sweep daemon stopped");
        signal
    })?;
    Ok(())
}
