// =============================================================================
// Strategy Registry — capability interface + compile-time plugin registry
// =============================================================================
//
// Strategies are a pure capability interface: `analyze`, `on_position_opened`,
// `on_position_closed`, `default_config`. No back-pointers into engine state
// (the source language wires strategies with runtime setters; here a
// read-only `StrategyContext` is passed per call instead). Dynamic module
// loading is replaced by a compile-time registry keyed by strategy *type*;
// "hot reload" re-reads an instance's config section and re-instantiates it.
// =============================================================================

pub mod orb;
pub mod scalping;
pub mod spreads;
pub mod swing;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, warn};

use crate::runtime_config::{LiquidityAnalysis, RuntimeConfig, StrategyInstanceConfig};
use crate::store::TradeStore;
use crate::types::{DepthSnapshot, Quote, Regime, Signal};

/// Read-only context handed to a strategy on every `analyze` call. Strategies
/// never see engine state beyond this.
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    pub quote: Quote,
    pub depth: &'a DepthSnapshot,
    pub regime: Regime,
    pub sector_rs_slope: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub vix_slope: Option<f64>,
    /// Configured defaults for liquidity-zone strategies; instances may
    /// override individual fields via their own `params`.
    pub liquidity: &'a LiquidityAnalysis,
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("strategy analysis failed: {0}")]
    Analysis(String),
}

/// The capability interface every strategy implements.
pub trait Strategy: Send + Sync {
    fn strategy_type(&self) -> &'static str;
    fn version(&self) -> &'static str {
        "1.0.0"
    }
    fn description(&self) -> &'static str;

    fn default_config(&self) -> Value {
        Value::Object(Default::default())
    }

    fn validate_config(&self, _config: &Value) -> Result<(), String> {
        Ok(())
    }

    fn analyze(&self, ctx: &StrategyContext, instance_cfg: &StrategyInstanceConfig) -> Result<Option<Signal>, StrategyError>;

    fn on_position_opened(&self, _symbol: &str) {}
    fn on_position_closed(&self, _symbol: &str) {}
}

/// One loaded strategy instance: its name, the shared implementation, and
/// its merged (user-over-default) config.
pub struct StrategyInstance {
    pub name: String,
    pub enabled: RwLock<bool>,
    pub strategy: Box<dyn Strategy>,
    pub config: StrategyInstanceConfig,
}

/// Factory function for a strategy type, used by the compile-time registry.
type StrategyFactory = fn() -> Box<dyn Strategy>;

pub struct StrategyRegistry {
    factories: HashMap<&'static str, StrategyFactory>,
    instances: RwLock<HashMap<String, StrategyInstance>>,
    store: Arc<TradeStore>,
}

impl StrategyRegistry {
    pub fn new(store: Arc<TradeStore>) -> Self {
        let mut factories: HashMap<&'static str, StrategyFactory> = HashMap::new();
        factories.insert("swing", || Box::new(swing::SwingStrategy::new()));
        factories.insert("scalping", || Box::new(scalping::ScalpingStrategy::new()));
        factories.insert("vix_momentum_orb", || Box::new(orb::VixMomentumOrb::new()));
        factories.insert("bull_put_spread", || Box::new(spreads::BullPutSpread::new()));
        factories.insert("bear_put_spread", || Box::new(spreads::BearPutSpread::new()));
        factories.insert("long_put_straight", || Box::new(spreads::LongPutStraight::new()));
        factories.insert("iron_condor", || Box::new(spreads::IronCondorStrategy::new()));

        Self {
            factories,
            instances: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Instantiate every strategy instance named in config whose type is
    /// known to the registry and whose `enabled` flag is true.
    pub async fn load_from_config(&self, cfg: &RuntimeConfig) {
        for (name, instance_cfg) in &cfg.strategies {
            self.load_one(name, instance_cfg).await;
        }
    }

    /// Instantiates the strategy and ensures its budget row exists — every
    /// configured instance gets one regardless of its `enabled` flag, so
    /// enabling it later doesn't race the first scan tick.
    async fn load_one(&self, name: &str, instance_cfg: &StrategyInstanceConfig) {
        let Some(factory) = self.factories.get(instance_cfg.strategy_type.as_str()) else {
            warn!(name, strategy_type = %instance_cfg.strategy_type, "unknown strategy type — skipping");
            return;
        };
        let strategy = factory();
        if let Err(e) = strategy.validate_config(&Value::Object(
            instance_cfg
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )) {
            error!(name, error = %e, "strategy config failed validation — not loading");
            return;
        }
        if let Err(e) = self.store.ensure_budget(name, instance_cfg.budget).await {
            error!(name, error = %e, "failed to ensure strategy budget row");
        }
        self.instances.write().insert(
            name.to_string(),
            StrategyInstance {
                name: name.to_string(),
                enabled: RwLock::new(instance_cfg.enabled),
                strategy,
                config: instance_cfg.clone(),
            },
        );
    }

    /// Re-read one instance's config section and re-instantiate it,
    /// preserving its current enabled flag.
    pub async fn reload(&self, name: &str, cfg: &RuntimeConfig) -> bool {
        let Some(instance_cfg) = cfg.strategies.get(name) else {
            return false;
        };
        let was_enabled = self
            .instances
            .read()
            .get(name)
            .map(|i| *i.enabled.read())
            .unwrap_or(instance_cfg.enabled);

        let mut instance_cfg = instance_cfg.clone();
        instance_cfg.enabled = was_enabled;
        self.load_one(name, &instance_cfg).await;
        true
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        if let Some(instance) = self.instances.read().get(name) {
            *instance.enabled.write() = enabled;
            true
        } else {
            false
        }
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    /// (name, strategy_type, enabled) for every loaded instance, sorted by name.
    pub fn instance_summaries(&self) -> Vec<(String, &'static str, bool)> {
        let mut out: Vec<_> = self
            .instances
            .read()
            .values()
            .map(|i| (i.name.clone(), i.strategy.strategy_type(), *i.enabled.read()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Strategy names declared in config but not yet loaded (unknown-type
    /// rejects included, for operator visibility via `/discover`).
    pub fn get_unloaded_strategies(&self, cfg: &RuntimeConfig) -> Vec<String> {
        let loaded = self.instances.read();
        cfg.strategies
            .keys()
            .filter(|name| !loaded.contains_key(*name))
            .cloned()
            .collect()
    }

    pub async fn load_new_strategies(&self, cfg: &RuntimeConfig) -> Vec<String> {
        let unloaded = self.get_unloaded_strategies(cfg);
        let mut loaded_now = Vec::new();
        for name in unloaded {
            if let Some(instance_cfg) = cfg.strategies.get(&name) {
                if instance_cfg.enabled {
                    self.load_one(&name, instance_cfg).await;
                    loaded_now.push(name);
                }
            }
        }
        loaded_now
    }

    /// Dispatch `analyze` to every enabled strategy instance relevant to
    /// `symbol`, tagging each produced signal with the instance name/type.
    /// A strategy that errors is logged and skipped — it stays loaded.
    pub fn analyze_all(&self, ctx: &StrategyContext) -> Vec<Signal> {
        let instances = self.instances.read();
        let mut out = Vec::new();

        for instance in instances.values() {
            if !*instance.enabled.read() {
                continue;
            }
            if let Some(symbols) = &instance.config.symbols {
                if !symbols.iter().any(|s| s == ctx.symbol) {
                    continue;
                }
            }
            if let Some(allowed) = &instance.config.allowed_regimes {
                if !allowed.iter().any(|r| r == ctx.regime.to_string().as_str()) {
                    continue;
                }
            }

            match instance.strategy.analyze(ctx, &instance.config) {
                Ok(Some(mut signal)) => {
                    signal
                        .metadata
                        .insert("strategy".into(), Value::String(instance.name.clone()));
                    signal.metadata.insert(
                        "strategy_type".into(),
                        Value::String(instance.strategy.strategy_type().to_string()),
                    );
                    out.push(signal);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(name = %instance.name, error = %e, "strategy analyze failed — skipping this scan");
                }
            }
        }
        out
    }

    pub fn notify_opened(&self, strategy_name: &str, symbol: &str) {
        if let Some(instance) = self.instances.read().get(strategy_name) {
            instance.strategy.on_position_opened(symbol);
        }
    }

    pub fn notify_closed(&self, strategy_name: &str, symbol: &str) {
        if let Some(instance) = self.instances.read().get(strategy_name) {
            instance.strategy.on_position_closed(symbol);
        }
    }
}
