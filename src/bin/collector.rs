//! Collector Runtime
//!
//! Bootstraps both record families (creating and backfilling missing tables),
//! then polls every source on a fixed interval until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin collector -- [--db-path PATH] [--quiet] [--drop-tables]
//!
//! Environment variables:
//!   DCREXTDATA_DB_PATH - SQLite database path (default: dcrextdata.db)
//!   COLLECT_INTERVAL_SECS - Poll interval (default: 1800)
//!   EXCHANGE_SOURCES - Enabled exchanges (default: bleutrade,binance)
//!   POW_SOURCES - Enabled pools (default: luxor,f2pool)
//!   RUST_LOG - Log filter (default: info)

use clap::Parser;
use dcrextdata::{
    collector::FamilyCollector,
    config::{logger_builder, CliArgs, CollectorConfig},
    scheduler::{FamilyPipeline, Schedule, Scheduler},
    sources::{self, EXCHANGE_REGISTRY, POW_REGISTRY},
    store::{FamilyStore, SqliteStore},
    types::{ExchangeTick, PowTick},
};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let mut config = CollectorConfig::from_env()?;
    CliArgs::parse().apply(&mut config);
    logger_builder(config.quiet).init();

    info!("🚀 dcrextdata collector");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Interval: {}s", config.interval_secs);
    info!("   ├─ Exchange sources: {}", config.exchange_sources.join(", "));
    info!("   └─ POW sources: {}", config.pow_sources.join(", "));

    let store = SqliteStore::open(&config.db_path).map_err(|e| {
        error!("❌ Error opening database: {}", e);
        e
    })?;

    if config.drop_tables {
        info!("🗑️  Dropping tables");
        FamilyStore::<ExchangeTick>::drop_table(&store)?;
        FamilyStore::<PowTick>::drop_table(&store)?;
        info!("✅ Tables dropped, exiting");
        return Ok(());
    }

    let client = sources::http_client(&config.sources)?;
    let exchange_sources = sources::build_sources(
        EXCHANGE_REGISTRY,
        &config.exchange_sources,
        &client,
        &config.sources,
        FamilyStore::<ExchangeTick>::stored_watermark(&store)?,
    )?;
    let pow_sources = sources::build_sources(
        POW_REGISTRY,
        &config.pow_sources,
        &client,
        &config.sources,
        FamilyStore::<PowTick>::stored_watermark(&store)?,
    )?;

    let exchange_store: Arc<dyn FamilyStore<ExchangeTick>> = Arc::new(store.clone());
    let pow_store: Arc<dyn FamilyStore<PowTick>> = Arc::new(store);

    let mut scheduler = Scheduler::new(
        FamilyPipeline::new(
            FamilyCollector::new(exchange_sources, config.backfill_safety_secs),
            exchange_store,
        ),
        FamilyPipeline::new(
            FamilyCollector::new(pow_sources, config.backfill_safety_secs),
            pow_store,
        ),
        Schedule {
            interval_secs: config.interval_secs,
            lead_secs: config.lead_secs,
        },
    );

    if let Err(e) = scheduler.bootstrap().await {
        error!("❌ Bootstrap failed: {}", e);
        return Err(e.into());
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️  Received CTRL+C, shutting down...");
                signal_cancel.cancel();
            }
            Err(err) => {
                error!("❌ Failed to listen for CTRL+C: {}", err);
            }
        }
    });

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let collector_task = tokio::spawn(async move { scheduler.run(cancel).await });

    match collector_task.await? {
        Ok(()) => {
            info!("✅ Collector stopped");
            Ok(())
        }
        Err(e) => {
            error!("❌ Collector stopped on error: {}", e);
            Err(e.into())
        }
    }
}
