// =============================================================================
// Sentinel Options — Main Entry Point
// =============================================================================
//
// The engine starts in whatever trading_mode/account_mode the saved config
// carries (default: Paused). The CLI and config file are the only ways to
// flip into Live trading; there is no implicit promotion on startup.
// =============================================================================

mod broker;
mod cli;
mod context;
mod coordinator;
mod engine;
mod error;
mod notify;
mod runtime_config;
mod store;
mod strategy;
mod types;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::broker::paper::PaperBroker;
use crate::broker::BrokerAdapter;
use crate::context::MarketContext;
use crate::coordinator::Coordinator;
use crate::engine::TradingEngine;
use crate::notify::LogOnlySink;
use crate::runtime_config::RuntimeConfig;
use crate::store::TradeStore;
use crate::strategy::StrategyRegistry;

const CONFIG_PATH: &str = "runtime_config.json";
const PAPER_STARTING_ACCOUNT_VALUE: f64 = 100_000.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Sentinel Options — Starting Up                    ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    info!(
        symbols = ?config.symbols,
        trading_mode = %config.trading_mode,
        account_mode = %config.account_mode,
        "configuration loaded"
    );

    let db_path = config.database.path.clone();
    let store = Arc::new(TradeStore::connect(&db_path).await?);
    let broker: Arc<dyn BrokerAdapter> = Arc::new(PaperBroker::new(PAPER_STARTING_ACCOUNT_VALUE));
    let context = Arc::new(MarketContext::new());
    let registry = Arc::new(StrategyRegistry::new(store.clone()));
    registry.load_from_config(&config).await;

    let config = Arc::new(RwLock::new(config));
    let engine = Arc::new(TradingEngine::new(store.clone(), broker.clone(), context.clone()));
    let notify = Arc::new(LogOnlySink);

    let coordinator = Arc::new(Coordinator::new(
        config.clone(),
        store.clone(),
        broker.clone(),
        context.clone(),
        registry.clone(),
        engine.clone(),
        notify.clone(),
    ));

    coordinator.reconcile_startup().await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scan_coordinator = coordinator.clone();
    let scan_shutdown = shutdown_rx.clone();
    let scan_handle = tokio::spawn(async move {
        scan_coordinator.run(scan_shutdown).await;
    });

    let cli = cli::Cli::new(
        config.clone(),
        CONFIG_PATH.to_string(),
        store.clone(),
        registry.clone(),
        engine.clone(),
        shutdown_tx.clone(),
    );
    let cli_handle = tokio::spawn(async move {
        cli.run().await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received — stopping gracefully");
            let _ = shutdown_tx.send(true);
        }
        _ = cli_handle => {
            let _ = shutdown_tx.send(true);
        }
    }

    if let Err(e) = scan_handle.await {
        error!(error = %e, "scan loop task panicked");
    }

    cli::save_config_on_exit(&config.read(), CONFIG_PATH);

    info!("Sentinel Options shut down complete.");
    Ok(())
}
