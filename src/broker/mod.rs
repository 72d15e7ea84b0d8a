// =============================================================================
// Broker Adapter — the external contract every venue integration implements
// =============================================================================
//
// Compatibility is behavioral, not wire-format: a reference implementation
// might speak a specific venue's socket protocol, but nothing in the engine
// depends on it. `PaperBroker` is a deterministic in-memory simulation that
// makes the whole engine runnable and testable without a live venue.
// =============================================================================

pub mod paper;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{Bar, DepthSnapshot, OptionContract, Quote, Right};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    PendingSubmit,
    PreSubmitted,
    Submitted,
    Filled,
    Cancelled,
    Inactive,
    ApiCancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal_unfilled(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Inactive | Self::ApiCancelled | Self::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderStatus {
    pub state: OrderState,
    pub filled: i64,
    pub remaining: i64,
    pub avg_fill_price: f64,
}

/// Handles returned by `place_bracket`: entry, stop-loss, take-profit.
#[derive(Debug, Clone)]
pub struct BracketHandles {
    pub entry_order_id: String,
    pub stop_order_id: String,
    pub target_order_id: String,
}

/// A position the broker reports holding, keyed by contract id.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioEntry {
    pub con_id: i64,
    pub signed_quantity: i64,
    pub avg_cost: f64,
}

#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn quote(&self, symbol: &str) -> anyhow::Result<Option<Quote>>;

    async fn depth_snapshot(&self, symbol: &str, levels: usize) -> anyhow::Result<DepthSnapshot>;

    async fn historical_bars(
        &self,
        symbol: &str,
        bar_size: &str,
        duration: &str,
    ) -> anyhow::Result<Vec<Bar>>;

    /// Returns the richest option chain available between `min_days` and
    /// `max_days` to expiration, as `(strikes, expirations)`.
    async fn option_chain(
        &self,
        symbol: &str,
        min_days: i64,
        max_days: i64,
    ) -> anyhow::Result<(Vec<f64>, Vec<NaiveDate>)>;

    async fn qualify_option(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        strike: f64,
        right: Right,
    ) -> anyhow::Result<Option<OptionContract>>;

    async fn place_bracket(
        &self,
        contract: &OptionContract,
        qty: i64,
        entry: f64,
        stop: f64,
        target: f64,
        order_ref: &str,
    ) -> anyhow::Result<Option<BracketHandles>>;

    async fn order_status(&self, order_id: &str) -> anyhow::Result<Option<OrderStatus>>;

    async fn cancel(&self, order_id: &str) -> anyhow::Result<()>;

    async fn portfolio(&self) -> anyhow::Result<Vec<PortfolioEntry>>;

    async fn account_value(&self, tag: &str) -> anyhow::Result<f64>;

    async fn connected(&self) -> bool;

    /// Reported industry classification for `symbol`, used to resolve its
    /// sector ETF when no config override exists. `None` if the venue
    /// doesn't expose contract-detail classification.
    async fn industry(&self, _symbol: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
