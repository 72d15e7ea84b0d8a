// =============================================================================
// Operator CLI — interactive stdin command surface
// =============================================================================
//
// Runs concurrently with the scan loop on its own task; never blocks a scan.
// Commands mirror a typical ops console: status, strategy control, budgets,
// pnl, export. Unknown input gets `/help` rather than silently swallowed.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::engine::TradingEngine;
use crate::runtime_config::RuntimeConfig;
use crate::store::TradeStore;
use crate::strategy::StrategyRegistry;

const HELP_TEXT: &str = "\
Commands:
  /help                 show this text
  /status               trading mode, open/pending counts, regime
  /strategies           list loaded strategy instances
  /reload [name]        re-read config and re-instantiate one (or all) strategies
  /enable name          enable a strategy instance
  /disable name         disable a strategy instance
  /discover             list strategies declared in config but not loaded
  /pnl                  aggregate performance summary
  /budgets              per-strategy budget usage
  /metrics [symbol]     open positions, optionally filtered by symbol
  /trades [n]           last n trade history rows (default 20)
  /export trades|report write a CSV/report snapshot to disk
  /quit                 stop the process";

pub struct Cli {
    config: Arc<RwLock<RuntimeConfig>>,
    config_path: String,
    store: Arc<TradeStore>,
    registry: Arc<StrategyRegistry>,
    engine: Arc<TradingEngine>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl Cli {
    pub fn new(
        config: Arc<RwLock<RuntimeConfig>>,
        config_path: String,
        store: Arc<TradeStore>,
        registry: Arc<StrategyRegistry>,
        engine: Arc<TradingEngine>,
        shutdown: tokio::sync::watch::Sender<bool>,
    ) -> Self {
        Self {
            config,
            config_path,
            store,
            registry,
            engine,
            shutdown,
        }
    }

    /// Read commands from stdin until `/quit` or EOF.
    pub async fn run(&self) {
        println!("{HELP_TEXT}");
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if self.dispatch(line).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed — CLI exiting");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "error reading stdin");
                    break;
                }
            }
        }
    }

    /// Returns true when the process should shut down.
    async fn dispatch(&self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let arg = parts.next();

        match command {
            "/help" => println!("{HELP_TEXT}"),
            "/status" => self.cmd_status(),
            "/strategies" => self.cmd_strategies(),
            "/reload" => self.cmd_reload(arg).await,
            "/enable" => self.cmd_set_enabled(arg, true),
            "/disable" => self.cmd_set_enabled(arg, false),
            "/discover" => self.cmd_discover(),
            "/pnl" => self.cmd_pnl().await,
            "/budgets" => self.cmd_budgets().await,
            "/metrics" => self.cmd_metrics(arg),
            "/trades" => self.cmd_trades(arg).await,
            "/export" => self.cmd_export(arg).await,
            "/quit" => {
                info!("shutdown requested via CLI");
                let _ = self.shutdown.send(true);
                return true;
            }
            _ => println!("unknown command {command:?} — try /help"),
        }
        false
    }

    fn cmd_status(&self) {
        let cfg = self.config.read();
        let open = self.engine.open_positions_snapshot().len();
        let pending = self.engine.pending_orders_snapshot().len();
        println!(
            "mode={} account={} symbols={:?} regime-gated-hours={} open={open} pending={pending}",
            cfg.trading_mode, cfg.account_mode, cfg.symbols, cfg.safety.trading_hours_only
        );
    }

    fn cmd_strategies(&self) {
        for (name, strategy_type, enabled) in self.registry.instance_summaries() {
            println!("{name:<24} type={strategy_type:<20} enabled={enabled}");
        }
    }

    async fn cmd_reload(&self, name: Option<&str>) {
        let cfg = self.config.read().clone();
        match name {
            Some(name) => {
                if self.registry.reload(name, &cfg).await {
                    println!("reloaded {name}");
                } else {
                    println!("no such strategy in config: {name}");
                }
            }
            None => {
                let mut count = 0;
                for name in cfg.strategies.keys() {
                    if self.registry.reload(name, &cfg).await {
                        count += 1;
                    }
                }
                println!("reloaded {count} strategies");
            }
        }
    }

    fn cmd_set_enabled(&self, name: Option<&str>, enabled: bool) {
        let Some(name) = name else {
            println!("usage: /{} name", if enabled { "enable" } else { "disable" });
            return;
        };
        if self.registry.set_enabled(name, enabled) {
            println!("{name} enabled={enabled}");
        } else {
            println!("no such loaded strategy: {name}");
        }
    }

    fn cmd_discover(&self) {
        let cfg = self.config.read();
        let unloaded = self.registry.get_unloaded_strategies(&cfg);
        if unloaded.is_empty() {
            println!("nothing new to discover");
        } else {
            println!("unloaded: {unloaded:?}");
        }
    }

    async fn cmd_pnl(&self) {
        match self.store.export_performance_report(false).await {
            Ok(summary) => {
                println!(
                    "trades={} winners={} losers={} total_pnl={:.2}",
                    summary.total_trades, summary.winners, summary.losers, summary.total_pnl
                );
                for (symbol, pnl, count) in &summary.by_symbol {
                    println!("  {symbol:<8} trades={count} pnl={pnl:.2}");
                }
            }
            Err(e) => println!("error building performance report: {e}"),
        }
    }

    async fn cmd_budgets(&self) {
        let cfg = self.config.read().clone();
        for name in cfg.strategies.keys() {
            match self.store.get_budget(name).await {
                Ok(Some(b)) => println!(
                    "{name:<24} budget={:.2} drawdown={:.2} committed={:.2} available={:.2}",
                    b.budget,
                    b.drawdown,
                    b.committed,
                    b.available()
                ),
                Ok(None) => println!("{name:<24} (no budget row yet)"),
                Err(e) => println!("{name:<24} error: {e}"),
            }
        }
    }

    fn cmd_metrics(&self, symbol_filter: Option<&str>) {
        let positions = self.engine.open_positions_snapshot();
        for pos in positions.iter().filter(|p| {
            symbol_filter
                .map(|s| p.contract.symbol.eq_ignore_ascii_case(s))
                .unwrap_or(true)
        }) {
            println!(
                "{:<6} {:<10} qty={} entry={:.2} peak={:.2} stop={:.2} target={:.2}",
                pos.contract.symbol,
                pos.strategy_name,
                pos.quantity,
                pos.entry_price,
                pos.peak_price,
                pos.stop_loss,
                pos.profit_target
            );
        }
    }

    async fn cmd_trades(&self, count_arg: Option<&str>) {
        let n: usize = count_arg.and_then(|s| s.parse().ok()).unwrap_or(20);
        match self.store.export_trades_to_csv(false).await {
            Ok(csv) => {
                for line in csv.lines().rev().take(n) {
                    println!("{line}");
                }
            }
            Err(e) => println!("error exporting trades: {e}"),
        }
    }

    async fn cmd_export(&self, kind: Option<&str>) {
        let kind = kind.unwrap_or("trades");
        let result = match kind {
            "trades" => self.store.export_trades_to_csv(true).await.map(|csv| ("trades_export.csv", csv)),
            "report" => self
                .store
                .export_performance_report(true)
                .await
                .map(|summary| ("performance_report.json", serde_json::to_string_pretty(&serde_json::json!({
                    "total_trades": summary.total_trades,
                    "winners": summary.winners,
                    "losers": summary.losers,
                    "total_pnl": summary.total_pnl,
                })).unwrap_or_default())),
            other => {
                println!("unknown export kind {other:?} — use trades|report");
                return;
            }
        };
        match result {
            Ok((path, contents)) => match std::fs::write(path, contents) {
                Ok(()) => println!("wrote {path}"),
                Err(e) => println!("failed to write {path}: {e}"),
            },
            Err(e) => println!("export failed: {e}"),
        }
    }
}

/// Save the runtime config back to disk; called on graceful shutdown.
pub fn save_config_on_exit(config: &RuntimeConfig, path: &str) {
    if let Err(e) = config.save(path) {
        warn!(error = %e, "failed to save runtime config on shutdown");
    } else {
        info!(path, "runtime config saved");
    }
}
