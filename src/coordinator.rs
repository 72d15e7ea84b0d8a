// =============================================================================
// Coordinator — periodic scan loop tying context, strategies, and engine together
// =============================================================================

use std::sync::Arc;

use chrono::{Datelike, Timelike, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::BrokerAdapter;
use crate::context::sector::SECTOR_ETFS;
use crate::context::MarketContext;
use crate::engine::TradingEngine;
use crate::notify::NotificationSink;
use crate::runtime_config::RuntimeConfig;
use crate::store::TradeStore;
use crate::strategy::{StrategyContext, StrategyRegistry};
use crate::types::{Direction, TradingMode};

pub struct Coordinator {
    config: Arc<RwLock<RuntimeConfig>>,
    store: Arc<TradeStore>,
    broker: Arc<dyn BrokerAdapter>,
    context: Arc<MarketContext>,
    registry: Arc<StrategyRegistry>,
    engine: Arc<TradingEngine>,
    notify: Arc<dyn NotificationSink>,
}

impl Coordinator {
    pub fn new(
        config: Arc<RwLock<RuntimeConfig>>,
        store: Arc<TradeStore>,
        broker: Arc<dyn BrokerAdapter>,
        context: Arc<MarketContext>,
        registry: Arc<StrategyRegistry>,
        engine: Arc<TradingEngine>,
        notify: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            store,
            broker,
            context,
            registry,
            engine,
            notify,
        }
    }

    /// Run once at process start: load durable state, detect any positions
    /// closed out-of-band while the process was down.
    #[instrument(skip(self))]
    pub async fn reconcile_startup(&self) -> anyhow::Result<()> {
        self.engine.load_from_store().await?;
        self.engine.detect_manual_closes().await?;
        info!("startup reconciliation complete");
        Ok(())
    }

    /// Run the scan loop until `shutdown` is signalled.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let interval_secs = self.config.read().operation.scan_interval.max(1);
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(interval_secs)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "scan iteration failed");
                self.notify.error("coordinator", &e.to_string());
            }
        }
        info!("coordinator scan loop stopped");
    }

    #[instrument(skip(self))]
    pub async fn scan_once(&self) -> anyhow::Result<()> {
        let cfg = self.config.read().clone();

        if cfg.safety.emergency_stop || cfg.trading_mode == TradingMode::Killed {
            warn!("emergency stop engaged — skipping scan");
            return Ok(());
        }
        if cfg.trading_mode != TradingMode::Live {
            debug!("trading mode is not Live — scanning context only, no new entries");
        }
        let within_hours = within_trading_hours(Utc::now());
        if cfg.safety.trading_hours_only && !within_hours {
            debug!("outside trading hours — new entries suppressed, reconciliation still runs");
        }

        let daily_loss_breaker_tripped = self.check_daily_loss_breaker(&cfg).await?;

        self.refresh_context(&cfg).await;

        let newly_loaded = self.registry.load_new_strategies(&cfg).await;
        if !newly_loaded.is_empty() {
            info!(?newly_loaded, "loaded newly enabled strategy instances");
        }

        let entries_allowed =
            cfg.trading_mode == TradingMode::Live && !daily_loss_breaker_tripped && (!cfg.safety.trading_hours_only || within_hours);

        if entries_allowed {
            let account_value = self
                .broker
                .account_value("NetLiquidation")
                .await
                .unwrap_or(100_000.0);

            for symbol in &cfg.symbols {
                if let Err(e) = self.scan_symbol(symbol, &cfg, account_value).await {
                    error!(symbol, error = %e, "symbol scan failed");
                }
            }
        }

        self.engine.reconcile_pending(&cfg.order_management).await?;
        self.engine.check_exits(&cfg.risk_management).await?;
        self.engine.detect_manual_closes().await?;

        Ok(())
    }

    /// Consecutive-loss count and today's realized P&L, independent of the
    /// regime veto. Trips new entries for the remainder of the day but never
    /// touches existing positions' exit management.
    async fn check_daily_loss_breaker(&self, cfg: &RuntimeConfig) -> anyhow::Result<bool> {
        let consecutive = self.store.get_consecutive_losses(None).await?;
        if consecutive >= cfg.safety.max_consecutive_losses {
            warn!(consecutive, limit = cfg.safety.max_consecutive_losses, "consecutive-loss breaker tripped — pausing new entries");
            return Ok(true);
        }

        let today = Utc::now().date_naive();
        let daily_pnl = self.store.get_daily_pnl(today).await?;
        if daily_pnl < 0.0 && -daily_pnl >= cfg.safety.max_daily_loss {
            warn!(daily_pnl, limit = cfg.safety.max_daily_loss, "daily-loss breaker tripped — pausing new entries");
            return Ok(true);
        }
        Ok(false)
    }

    async fn scan_symbol(&self, symbol: &str, cfg: &RuntimeConfig, account_value: f64) -> anyhow::Result<()> {
        let Some(quote) = self.broker.quote(symbol).await? else {
            return Ok(());
        };
        let depth = self.broker.depth_snapshot(symbol, 10).await?;
        let regime = self.context.regime.current();
        let industry = self.broker.industry(symbol).await.unwrap_or(None);
        let sector = crate::context::sector::SectorRotation::sector_for_symbol(symbol, industry.as_deref(), &cfg.sector_rotation);
        let sector_rs_slope = sector.and_then(|etf| self.context.sector_rotation.rs_slope(&etf));

        let ctx = StrategyContext {
            symbol,
            quote,
            depth: &depth,
            regime,
            sector_rs_slope,
            timestamp: Utc::now(),
            vix_slope: self.context.vix_slope.slope(),
            liquidity: &cfg.liquidity_analysis,
        };

        let signals = self.registry.analyze_all(&ctx);
        for signal in signals {
            let Some(strategy_name) = signal.strategy_name().map(str::to_string) else {
                continue;
            };

            if signal.direction == Direction::NoTrade {
                self.engine.handle_no_trade_signal(&strategy_name, symbol, &signal).await?;
                continue;
            }

            let available_budget = self
                .store
                .get_budget(&strategy_name)
                .await?
                .map(|b| b.available());

            let spot = quote.mid().unwrap_or(quote.last);
            self.engine
                .place_signal(&strategy_name, symbol, &signal, spot, account_value, available_budget, cfg)
                .await?;
        }
        Ok(())
    }

    /// Refresh regime + sector rotation from daily bars. Tolerant of broker
    /// failures — a feed outage simply leaves the last known context in place.
    async fn refresh_context(&self, cfg: &RuntimeConfig) {
        let spy_bars = self
            .broker
            .historical_bars("SPY", "1 day", "300 D")
            .await
            .unwrap_or_default();
        let vix_bars = self
            .broker
            .historical_bars("VIX", "1 day", "30 D")
            .await
            .unwrap_or_default();

        self.context.regime.update(&spy_bars, &vix_bars, &cfg.market_regime);

        if let Ok(Some(vix_quote)) = self.broker.quote("VIX").await {
            let price = vix_quote.mid().unwrap_or(vix_quote.last);
            self.context.vix_slope.record(Utc::now(), price, cfg.market_regime.vix_slope_minutes);
        }

        for etf in SECTOR_ETFS {
            if let Ok(etf_bars) = self.broker.historical_bars(etf, "1 day", "30 D").await {
                self.context
                    .sector_rotation
                    .update_sector(etf, &etf_bars, &spy_bars, &cfg.sector_rotation);
            }
        }
    }
}

/// Regular US equity session, 9:30-16:00 America/New_York, Monday-Friday.
fn within_trading_hours(now: chrono::DateTime<Utc>) -> bool {
    let ny = now.with_timezone(&chrono_tz::America::New_York);
    if matches!(ny.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
        return false;
    }
    let minutes_since_midnight = ny.hour() * 60 + ny.minute();
    (9 * 60 + 30..16 * 60).contains(&minutes_since_midnight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekend_is_outside_trading_hours() {
        let saturday = chrono_tz::America::New_York
            .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!within_trading_hours(saturday));
    }

    #[test]
    fn mid_session_weekday_is_within_trading_hours() {
        let wednesday = chrono_tz::America::New_York
            .with_ymd_and_hms(2024, 6, 5, 11, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(within_trading_hours(wednesday));
    }
}
