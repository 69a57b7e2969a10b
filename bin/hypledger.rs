use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use hypervisor_ledger::{db::PeggedPriceSource, replay_all, Settings, Stores};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let level = LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Info);
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    let mut stores = Stores::postgres(settings.clone())
        .await
        .context("Failed to initialize database connection")?;

    let pegged = PeggedPriceSource::new(&settings.replay.network, &settings.replay.pegged_prices);
    if !pegged.is_empty() {
        info!(
            "Using {} pegged token prices on {}",
            settings.replay.pegged_prices.len(),
            settings.replay.network
        );
        stores = stores.with_price_source(Arc::new(pegged));
    }

    run_replays(settings, stores).await
}

async fn run_replays(settings: Arc<Settings>, stores: Stores) -> anyhow::Result<()> {
    if settings.replay.hypervisors.is_empty() {
        warn!("No hypervisors configured under replay.hypervisors, nothing to do");
        return Ok(());
    }

    info!(
        "Replaying {} hypervisors on {}. Press Ctrl+C to stop.",
        settings.replay.hypervisors.len(),
        settings.replay.network
    );

    let replays = async {
        let results = replay_all(&settings.replay.hypervisors, stores, &settings.replay).await;
        let mut failed = 0usize;
        for result in &results {
            match result {
                Ok(summary) => info!(
                    "[{}] replayed {} of {} operations from block {} ({} ledger entries, {} fee distributions, last block {})",
                    summary.hypervisor,
                    summary.applied,
                    summary.fetched,
                    summary.from_block,
                    summary.entries_written,
                    summary.fee_distributions,
                    summary.last_block.map_or_else(|| "-".to_string(), |b| b.to_string())
                ),
                Err(e) => {
                    error!("Replay failed: {}", e);
                    failed += 1;
                },
            }
        }
        (failed, results.len())
    };

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    #[cfg(unix)]
    {
        tokio::select! {
            (failed, total) = replays => {
                if failed > 0 {
                    anyhow::bail!("{} of {} hypervisor replays failed", failed, total);
                }
                info!("All replays finished");
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            (failed, total) = replays => {
                if failed > 0 {
                    anyhow::bail!("{} of {} hypervisor replays failed", failed, total);
                }
                info!("All replays finished");
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    // Ledger writes are idempotent per key, so an interrupted replay resumes cleanly.
    Ok(())
}
