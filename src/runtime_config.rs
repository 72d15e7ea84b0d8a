// =============================================================================
// Runtime Configuration — declarative TOML config with atomic save
// =============================================================================
//
// Every tunable parameter the trading engine needs lives here so it can be
// reconfigured without recompiling. Persistence uses an atomic tmp + rename
// pattern to prevent corruption on crash. Every field carries a serde
// default so adding a field never breaks loading an older config file.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::types::{AccountMode, TradingMode};

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec!["AAPL".into(), "MSFT".into(), "NVDA".into(), "SPY".into()]
}

fn default_scan_interval() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".into()
}

fn default_db_path() -> String {
    "trades.db".into()
}

// --- risk_management --------------------------------------------------------

fn default_profit_target_pct() -> f64 {
    0.5
}
fn default_stop_loss_pct() -> f64 {
    0.3
}
fn default_trailing_stop_activation_pct() -> f64 {
    0.25
}
fn default_trailing_stop_distance_pct() -> f64 {
    0.15
}
fn default_max_hold_days() -> i64 {
    5
}
fn default_max_position_size() -> f64 {
    2_000.0
}
fn default_max_positions() -> u32 {
    10
}
fn default_position_size_pct() -> f64 {
    0.02
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskManagement {
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_true")]
    pub trailing_stop_enabled: bool,
    #[serde(default = "default_trailing_stop_activation_pct")]
    pub trailing_stop_activation_pct: f64,
    #[serde(default = "default_trailing_stop_distance_pct")]
    pub trailing_stop_distance_pct: f64,
    #[serde(default = "default_max_hold_days")]
    pub max_hold_days: i64,
    /// Dollar cap on per-trade notional.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    /// Count cap on concurrent positions per strategy.
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: f64,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            profit_target_pct: default_profit_target_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            trailing_stop_enabled: true,
            trailing_stop_activation_pct: default_trailing_stop_activation_pct(),
            trailing_stop_distance_pct: default_trailing_stop_distance_pct(),
            max_hold_days: default_max_hold_days(),
            max_position_size: default_max_position_size(),
            max_positions: default_max_positions(),
            position_size_pct: default_position_size_pct(),
        }
    }
}

// --- trading_rules (legacy pattern confidence table) ------------------------

fn default_rejection_support_conf() -> f64 {
    0.6
}
fn default_breakout_up_conf() -> f64 {
    0.7
}
fn default_rejection_resistance_conf() -> f64 {
    0.6
}
fn default_breakout_down_conf() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingRules {
    #[serde(default = "default_rejection_support_conf")]
    pub rejection_at_support_min_confidence: f64,
    #[serde(default = "default_breakout_up_conf")]
    pub potential_breakout_up_min_confidence: f64,
    #[serde(default = "default_rejection_resistance_conf")]
    pub rejection_at_resistance_min_confidence: f64,
    #[serde(default = "default_breakout_down_conf")]
    pub potential_breakout_down_min_confidence: f64,
}

impl Default for TradingRules {
    fn default() -> Self {
        Self {
            rejection_at_support_min_confidence: default_rejection_support_conf(),
            potential_breakout_up_min_confidence: default_breakout_up_conf(),
            rejection_at_resistance_min_confidence: default_rejection_resistance_conf(),
            potential_breakout_down_min_confidence: default_breakout_down_conf(),
        }
    }
}

// --- option_selection --------------------------------------------------------

fn default_min_dte() -> i64 {
    7
}
fn default_max_dte() -> i64 {
    45
}
fn default_call_strike_pct() -> f64 {
    1.02
}
fn default_put_strike_pct() -> f64 {
    0.98
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSelection {
    #[serde(default = "default_min_dte")]
    pub min_dte: i64,
    #[serde(default = "default_max_dte")]
    pub max_dte: i64,
    #[serde(default = "default_call_strike_pct")]
    pub call_strike_pct: f64,
    #[serde(default = "default_put_strike_pct")]
    pub put_strike_pct: f64,
}

impl Default for OptionSelection {
    fn default() -> Self {
        Self {
            min_dte: default_min_dte(),
            max_dte: default_max_dte(),
            call_strike_pct: default_call_strike_pct(),
            put_strike_pct: default_put_strike_pct(),
        }
    }
}

// --- order_management ---------------------------------------------------------

fn default_order_timeout_seconds() -> i64 {
    60
}
fn default_price_drift_threshold() -> f64 {
    0.10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderManagement {
    #[serde(default = "default_order_timeout_seconds")]
    pub order_timeout_seconds: i64,
    #[serde(default = "default_price_drift_threshold")]
    pub price_drift_threshold: f64,
    #[serde(default = "default_true")]
    pub use_bracket_orders: bool,
}

impl Default for OrderManagement {
    fn default() -> Self {
        Self {
            order_timeout_seconds: default_order_timeout_seconds(),
            price_drift_threshold: default_price_drift_threshold(),
            use_bracket_orders: true,
        }
    }
}

// --- market_regime / sector_rotation --------------------------------------

fn default_high_chaos_vix_change() -> f64 {
    0.20
}
fn default_high_chaos_spy_vol() -> f64 {
    0.02
}
fn default_high_chaos_vix() -> f64 {
    30.0
}
fn default_range_min() -> f64 {
    15.0
}
fn default_range_max() -> f64 {
    25.0
}
fn default_bull_vix() -> f64 {
    20.0
}
fn default_vix_slope_minutes() -> i64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    #[serde(default = "default_high_chaos_vix_change")]
    pub high_chaos_vix_change: f64,
    #[serde(default = "default_high_chaos_spy_vol")]
    pub high_chaos_spy_vol: f64,
    #[serde(default = "default_high_chaos_vix")]
    pub high_chaos_vix: f64,
    #[serde(default = "default_range_min")]
    pub range_min: f64,
    #[serde(default = "default_range_max")]
    pub range_max: f64,
    #[serde(default = "default_bull_vix")]
    pub bull_vix: f64,
    /// Trailing window for the VIX-momentum ORB slope calculation.
    #[serde(default = "default_vix_slope_minutes")]
    pub vix_slope_minutes: i64,
}

impl Default for MarketRegime {
    fn default() -> Self {
        Self {
            high_chaos_vix_change: default_high_chaos_vix_change(),
            high_chaos_spy_vol: default_high_chaos_spy_vol(),
            high_chaos_vix: default_high_chaos_vix(),
            range_min: default_range_min(),
            range_max: default_range_max(),
            bull_vix: default_bull_vix(),
            vix_slope_minutes: default_vix_slope_minutes(),
        }
    }
}

fn default_rs_window() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorRotation {
    #[serde(default = "default_rs_window")]
    pub rs_window: usize,
    #[serde(default)]
    pub symbol_sector_overrides: HashMap<String, String>,
}

impl Default for SectorRotation {
    fn default() -> Self {
        Self {
            rs_window: default_rs_window(),
            symbol_sector_overrides: HashMap::new(),
        }
    }
}

// --- liquidity_analysis --------------------------------------------------------

fn default_liquidity_threshold() -> f64 {
    500.0
}
fn default_zone_proximity() -> f64 {
    0.3
}
fn default_imbalance_threshold() -> f64 {
    0.4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAnalysis {
    #[serde(default = "default_liquidity_threshold")]
    pub liquidity_threshold: f64,
    #[serde(default = "default_zone_proximity")]
    pub zone_proximity: f64,
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,
}

impl Default for LiquidityAnalysis {
    fn default() -> Self {
        Self {
            liquidity_threshold: default_liquidity_threshold(),
            zone_proximity: default_zone_proximity(),
            imbalance_threshold: default_imbalance_threshold(),
        }
    }
}

// --- per-strategy-instance config ------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstanceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy_type: String,
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub max_positions: Option<u32>,
    #[serde(default)]
    pub allowed_regimes: Option<Vec<String>>,
    #[serde(default)]
    pub min_sector_rs: Option<f64>,
    /// Strategy-type-specific parameters, kept opaque here and interpreted
    /// by the owning strategy's `default_config`/`validate_config`.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

fn default_budget() -> f64 {
    5_000.0
}

impl Default for StrategyInstanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy_type: String::new(),
            budget: default_budget(),
            symbols: None,
            max_positions: None,
            allowed_regimes: None,
            min_sector_rs: None,
            params: HashMap::new(),
        }
    }
}

// --- safety -------------------------------------------------------------------

fn default_max_daily_loss() -> f64 {
    1_000.0
}

fn default_max_consecutive_losses() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Safety {
    #[serde(default)]
    pub trading_hours_only: bool,
    #[serde(default)]
    pub emergency_stop: bool,
    #[serde(default)]
    pub require_manual_approval: bool,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: f64,
    /// Consecutive losing trades (any strategy) before new entries pause for the day.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            trading_hours_only: true,
            emergency_stop: false,
            require_manual_approval: false,
            max_daily_loss: default_max_daily_loss(),
            max_consecutive_losses: default_max_consecutive_losses(),
        }
    }
}

// --- operation / database / notifications ----------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub enable_paper_trading: bool,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            log_level: default_log_level(),
            enable_paper_trading: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notifications {
    #[serde(default)]
    pub discord_webhook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConnection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: i64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7497
}
fn default_client_id() -> i64 {
    1
}

impl Default for BrokerConnection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
        }
    }
}

// --- top-level ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub account_mode: AccountMode,

    #[serde(default)]
    pub broker_connection: BrokerConnection,

    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub risk_management: RiskManagement,
    #[serde(default)]
    pub trading_rules: TradingRules,
    #[serde(default)]
    pub option_selection: OptionSelection,
    #[serde(default)]
    pub order_management: OrderManagement,
    #[serde(default)]
    pub market_regime: MarketRegime,
    #[serde(default)]
    pub sector_rotation: SectorRotation,
    #[serde(default)]
    pub liquidity_analysis: LiquidityAnalysis,

    #[serde(default)]
    pub strategies: HashMap<String, StrategyInstanceConfig>,

    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub notifications: Notifications,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            broker_connection: BrokerConnection::default(),
            symbols: default_symbols(),
            risk_management: RiskManagement::default(),
            trading_rules: TradingRules::default(),
            option_selection: OptionSelection::default(),
            order_management: OrderManagement::default(),
            market_regime: MarketRegime::default(),
            sector_rotation: SectorRotation::default(),
            liquidity_analysis: LiquidityAnalysis::default(),
            strategies: HashMap::new(),
            safety: Safety::default(),
            operation: Operation::default(),
            database: Database::default(),
            notifications: Notifications::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            trading_mode = %config.trading_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename) so a crash mid-write never corrupts it.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        use anyhow::Context;

        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("failed to serialise runtime config")?;

        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert!(!cfg.symbols.is_empty());
        assert!((cfg.risk_management.profit_target_pct - 0.5).abs() < f64::EPSILON);
        assert!((cfg.risk_management.stop_loss_pct - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.risk_management.max_positions, 10);
        assert!(cfg.safety.trading_hours_only);
    }

    #[test]
    fn deserialise_empty_toml_uses_defaults() {
        let cfg: RuntimeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert!(cfg.risk_management.trailing_stop_enabled);
        assert_eq!(cfg.option_selection.min_dte, 7);
    }

    #[test]
    fn deserialise_partial_toml_fills_defaults() {
        let toml_src = r#"
            symbols = ["NVDA"]

            [risk_management]
            profit_target_pct = 0.75
        "#;
        let cfg: RuntimeConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.symbols, vec!["NVDA"]);
        assert!((cfg.risk_management.profit_target_pct - 0.75).abs() < f64::EPSILON);
        // untouched fields keep their defaults
        assert!((cfg.risk_management.stop_loss_pct - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.option_selection.max_dte, 45);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let s = toml::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = toml::from_str(&s).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
        assert_eq!(cfg.risk_management.max_positions, cfg2.risk_management.max_positions);
    }

    #[test]
    fn strategy_instance_config_defaults_to_disabled() {
        let sic = StrategyInstanceConfig::default();
        assert!(!sic.enabled);
        assert!((sic.budget - 5_000.0).abs() < f64::EPSILON);
    }
}
