// =============================================================================
// Shared domain types for the options trading engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Whether the engine is actively trading, paused, or killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paused,
    Killed,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Paused => write!(f, "Paused"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Whether we are running against a real broker or the paper simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    Demo,
    Live,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Which side of the option chain a contract sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Right {
    Call,
    Put,
}

impl std::fmt::Display for Right {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Closed set of trade directions a strategy may propose. Never a free string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LongCall,
    LongPut,
    NoTrade,
    BullPutSpread,
    BearPutSpread,
    LongPutStraight,
    IronCondor,
}

impl Direction {
    pub fn is_bullish(self) -> bool {
        matches!(self, Self::LongCall | Self::BullPutSpread)
    }

    pub fn is_bearish(self) -> bool {
        matches!(
            self,
            Self::LongPut | Self::BearPutSpread | Self::LongPutStraight
        )
    }

    pub fn right(self) -> Right {
        match self {
            Self::LongCall | Self::BullPutSpread => Right::Call,
            _ => Right::Put,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LongCall => "long_call",
            Self::LongPut => "long_put",
            Self::NoTrade => "no_trade",
            Self::BullPutSpread => "bull_put_spread",
            Self::BearPutSpread => "bear_put_spread",
            Self::LongPutStraight => "long_put_straight",
            Self::IronCondor => "iron_condor",
        };
        write!(f, "{s}")
    }
}

/// Closed set of chart/order-flow patterns strategies may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    TestingSupport,
    TestingResistance,
    PotentialBreakoutUp,
    PotentialBreakoutDown,
    Consolidation,
    RejectionAtSupport,
    RejectionAtResistance,
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TestingSupport => "testing_support",
            Self::TestingResistance => "testing_resistance",
            Self::PotentialBreakoutUp => "potential_breakout_up",
            Self::PotentialBreakoutDown => "potential_breakout_down",
            Self::Consolidation => "consolidation",
            Self::RejectionAtSupport => "rejection_at_support",
            Self::RejectionAtResistance => "rejection_at_resistance",
        };
        write!(f, "{s}")
    }
}

/// Market regime classification driven by SPY/VIX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    BullTrend,
    BearTrend,
    RangeBound,
    HighChaos,
    Unknown,
}

impl Default for Regime {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BullTrend => "bull_trend",
            Self::BearTrend => "bear_trend",
            Self::RangeBound => "range_bound",
            Self::HighChaos => "high_chaos",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Closed set of reasons a position or pending order may leave the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    ProfitTarget,
    StopLoss,
    TrailingStop,
    MaxHold,
    ManualClose,
    ReconciliationNotFound,
    OrderCancelled,
    OrderTimeoutDrift,
    OrderTimeoutNoPrice,
    OrderFailed,
    OrderNoFills,
}

impl ExitReason {
    /// Administrative reasons excluded from performance figures by default.
    pub fn is_administrative(self) -> bool {
        matches!(self, Self::ManualClose | Self::ReconciliationNotFound)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProfitTarget => "profit_target",
            Self::StopLoss => "stop_loss",
            Self::TrailingStop => "trailing_stop",
            Self::MaxHold => "max_hold",
            Self::ManualClose => "manual_close",
            Self::ReconciliationNotFound => "reconciliation_not_found",
            Self::OrderCancelled => "order_cancelled",
            Self::OrderTimeoutDrift => "order_timeout_drift",
            Self::OrderTimeoutNoPrice => "order_timeout_no_price",
            Self::OrderFailed => "order_failed",
            Self::OrderNoFills => "order_no_fills",
        };
        write!(f, "{s}")
    }
}

/// An option contract, qualified against the broker's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub con_id: i64,
    pub symbol: String,
    pub local_symbol: String,
    pub strike: f64,
    pub expiry: chrono::NaiveDate,
    pub right: Right,
}

/// A signal produced by a strategy for one symbol on one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub confidence: f64,
    pub pattern_name: Option<Pattern>,
    pub price_level: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Signal {
    pub fn new(direction: Direction, confidence: f64, pattern_name: Option<Pattern>) -> Self {
        assert!(
            (0.0..=1.0).contains(&confidence),
            "signal confidence must be within [0, 1], got {confidence}"
        );
        Self {
            direction,
            confidence,
            pattern_name,
            price_level: None,
            metadata: HashMap::new(),
        }
    }

    pub fn strategy_name(&self) -> Option<&str> {
        self.metadata.get("strategy").and_then(|v| v.as_str())
    }
}

/// An order placed but not yet (fully) filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub store_id: i64,
    pub order_ref: String,
    pub strategy_name: String,
    pub contract: OptionContract,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: i64,
    pub stop_loss: f64,
    pub profit_target: f64,
    pub order_time: DateTime<Utc>,
    pub entry_order_id: String,
    pub stop_order_id: String,
    pub target_order_id: String,
}

/// An open position held by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub store_id: i64,
    pub order_ref: String,
    pub strategy_name: String,
    pub contract: OptionContract,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: i64,
    pub stop_loss: f64,
    pub profit_target: f64,
    pub entry_time: DateTime<Utc>,
    pub peak_price: f64,
    pub stop_order_id: String,
    pub target_order_id: String,
}

impl Position {
    pub fn id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.order_ref.as_bytes())
    }

    pub fn committed_dollars(&self) -> f64 {
        self.entry_price * self.quantity as f64 * 100.0
    }
}

/// An immutable row written when a position closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryEntry {
    pub store_id: i64,
    pub order_ref: String,
    pub strategy_name: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub exit_order_id: Option<String>,
    pub pnl_dollars: f64,
    pub pnl_pct: f64,
}

/// Per-strategy-instance budget accounting. See invariant in `available()`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyBudget {
    pub budget: f64,
    pub drawdown: f64,
    pub committed: f64,
}

impl StrategyBudget {
    pub fn available(&self) -> f64 {
        (self.budget - self.drawdown - self.committed).max(0.0)
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One price level in a depth-of-market snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
}

/// Top-of-book plus aggregated L2 depth for one symbol at one instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl DepthSnapshot {
    /// Extend the book to cover `position`, working around upstream feeds
    /// that report depth updates at positions past the current book length.
    pub fn ensure_bid_len(&mut self, position: usize) {
        while self.bids.len() <= position {
            self.bids.push(DepthLevel { price: 0.0, size: 0.0 });
        }
    }

    pub fn ensure_ask_len(&mut self, position: usize) {
        while self.asks.len() <= position {
            self.asks.push(DepthLevel { price: 0.0, size: 0.0 });
        }
    }

    pub fn total_bid_size(&self) -> f64 {
        self.bids.iter().map(|l| l.size).sum()
    }

    pub fn total_ask_size(&self) -> f64 {
        self.asks.iter().map(|l| l.size).sum()
    }

    /// `(Σbids − Σasks) / (Σbids + Σasks)`, clamped into [-1, 1]; 0 when empty.
    pub fn imbalance(&self) -> f64 {
        let b = self.total_bid_size();
        let a = self.total_ask_size();
        if b + a <= 0.0 {
            return 0.0;
        }
        ((b - a) / (b + a)).clamp(-1.0, 1.0)
    }
}

/// A quote for an underlying or option.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub close: f64,
}

impl Quote {
    pub fn mid(&self) -> Option<f64> {
        if self.bid > 0.0 && self.ask > 0.0 {
            Some((self.bid + self.ask) / 2.0)
        } else if self.last > 0.0 {
            Some(self.last)
        } else {
            None
        }
    }
}
