// =============================================================================
// PaperBroker — deterministic in-memory simulation of the broker contract
// =============================================================================
//
// Used as the default adapter (and in tests). Quotes, depth, bars, and the
// option chain are seeded through the `seed_*` setters rather than fetched
// over the network; order placement and status tracking are fully real,
// just against a simulated book instead of a live venue.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::instrument;

use crate::types::{Bar, DepthSnapshot, OptionContract, Quote, Right};

use super::{BracketHandles, BrokerAdapter, OrderState, OrderStatus, PortfolioEntry};

#[derive(Debug, Clone)]
struct SimOrder {
    con_id: i64,
    qty: i64,
    limit_price: f64,
    state: OrderState,
    filled: i64,
    avg_fill_price: f64,
}

pub struct PaperBroker {
    connected: RwLock<bool>,
    account_value: RwLock<f64>,
    quotes: RwLock<HashMap<String, Quote>>,
    depths: RwLock<HashMap<String, DepthSnapshot>>,
    bars: RwLock<HashMap<(String, String), Vec<Bar>>>,
    chains: RwLock<HashMap<String, (Vec<f64>, Vec<NaiveDate>)>>,
    contracts: RwLock<HashMap<i64, OptionContract>>,
    orders: RwLock<HashMap<String, SimOrder>>,
    portfolio: RwLock<Vec<PortfolioEntry>>,
    next_con_id: AtomicI64,
    next_order_id: AtomicI64,
}

impl PaperBroker {
    pub fn new(starting_account_value: f64) -> Self {
        Self {
            connected: RwLock::new(true),
            account_value: RwLock::new(starting_account_value),
            quotes: RwLock::new(HashMap::new()),
            depths: RwLock::new(HashMap::new()),
            bars: RwLock::new(HashMap::new()),
            chains: RwLock::new(HashMap::new()),
            contracts: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            portfolio: RwLock::new(Vec::new()),
            next_con_id: AtomicI64::new(1),
            next_order_id: AtomicI64::new(1),
        }
    }

    pub fn seed_quote(&self, symbol: &str, quote: Quote) {
        self.quotes.write().insert(symbol.to_string(), quote);
    }

    pub fn seed_depth(&self, symbol: &str, depth: DepthSnapshot) {
        self.depths.write().insert(symbol.to_string(), depth);
    }

    pub fn seed_bars(&self, symbol: &str, bar_size: &str, bars: Vec<Bar>) {
        self.bars
            .write()
            .insert((symbol.to_string(), bar_size.to_string()), bars);
    }

    pub fn seed_chain(&self, symbol: &str, strikes: Vec<f64>, expirations: Vec<NaiveDate>) {
        self.chains
            .write()
            .insert(symbol.to_string(), (strikes, expirations));
    }

    pub fn set_connected(&self, connected: bool) {
        *self.connected.write() = connected;
    }

    pub fn set_account_value(&self, value: f64) {
        *self.account_value.write() = value;
    }

    /// Manually remove a portfolio entry, simulating an out-of-band
    /// (manual) close at the venue that the engine must detect.
    pub fn simulate_manual_close(&self, con_id: i64) {
        self.portfolio.write().retain(|p| p.con_id != con_id);
    }

    /// Advance a previously-placed order's fill state, for tests that drive
    /// the pending-order reconciliation state machine directly.
    pub fn set_order_state(&self, order_id: &str, state: OrderState, filled: i64, avg_price: f64) {
        if let Some(order) = self.orders.write().get_mut(order_id) {
            order.state = state;
            order.filled = filled;
            order.avg_fill_price = avg_price;
        }
    }

    fn next_order_ref(&self) -> String {
        format!("paper-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    #[instrument(skip(self), name = "paper_broker::quote")]
    async fn quote(&self, symbol: &str) -> anyhow::Result<Option<Quote>> {
        Ok(self.quotes.read().get(symbol).copied())
    }

    #[instrument(skip(self), name = "paper_broker::depth_snapshot")]
    async fn depth_snapshot(&self, symbol: &str, _levels: usize) -> anyhow::Result<DepthSnapshot> {
        Ok(self.depths.read().get(symbol).cloned().unwrap_or_default())
    }

    #[instrument(skip(self), name = "paper_broker::historical_bars")]
    async fn historical_bars(
        &self,
        symbol: &str,
        bar_size: &str,
        _duration: &str,
    ) -> anyhow::Result<Vec<Bar>> {
        Ok(self
            .bars
            .read()
            .get(&(symbol.to_string(), bar_size.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(skip(self), name = "paper_broker::option_chain")]
    async fn option_chain(
        &self,
        symbol: &str,
        _min_days: i64,
        _max_days: i64,
    ) -> anyhow::Result<(Vec<f64>, Vec<NaiveDate>)> {
        Ok(self.chains.read().get(symbol).cloned().unwrap_or_default())
    }

    #[instrument(skip(self), name = "paper_broker::qualify_option")]
    async fn qualify_option(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        strike: f64,
        right: Right,
    ) -> anyhow::Result<Option<OptionContract>> {
        let (strikes, expirations) = match self.chains.read().get(symbol).cloned() {
            Some(c) => c,
            None => return Ok(None),
        };
        if !expirations.contains(&expiry) || !strikes.iter().any(|s| (s - strike).abs() < 1e-6) {
            return Ok(None);
        }

        let con_id = self.next_con_id.fetch_add(1, Ordering::SeqCst);
        let local_symbol = format!(
            "{symbol} {} {strike:.1}{right}",
            expiry.format("%y%m%d")
        );
        let contract = OptionContract {
            con_id,
            symbol: symbol.to_string(),
            local_symbol,
            strike,
            expiry,
            right,
        };
        self.contracts.write().insert(con_id, contract.clone());
        Ok(Some(contract))
    }

    #[instrument(skip(self, contract), name = "paper_broker::place_bracket")]
    async fn place_bracket(
        &self,
        contract: &OptionContract,
        qty: i64,
        entry: f64,
        _stop: f64,
        _target: f64,
        _order_ref: &str,
    ) -> anyhow::Result<Option<BracketHandles>> {
        let entry_id = self.next_order_ref();
        let stop_id = self.next_order_ref();
        let target_id = self.next_order_ref();

        // Paper fills are immediate and at the requested limit price.
        self.orders.write().insert(
            entry_id.clone(),
            SimOrder {
                con_id: contract.con_id,
                qty,
                limit_price: entry,
                state: OrderState::Filled,
                filled: qty,
                avg_fill_price: entry,
            },
        );

        self.portfolio.write().push(PortfolioEntry {
            con_id: contract.con_id,
            signed_quantity: qty,
            avg_cost: entry,
        });

        Ok(Some(BracketHandles {
            entry_order_id: entry_id,
            stop_order_id: stop_id,
            target_order_id: target_id,
        }))
    }

    #[instrument(skip(self), name = "paper_broker::order_status")]
    async fn order_status(&self, order_id: &str) -> anyhow::Result<Option<OrderStatus>> {
        Ok(self.orders.read().get(order_id).map(|o| OrderStatus {
            state: o.state,
            filled: o.filled,
            remaining: o.qty - o.filled,
            avg_fill_price: o.avg_fill_price,
        }))
    }

    #[instrument(skip(self), name = "paper_broker::cancel")]
    async fn cancel(&self, order_id: &str) -> anyhow::Result<()> {
        if let Some(order) = self.orders.write().get_mut(order_id) {
            if order.filled == 0 {
                order.state = OrderState::Cancelled;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), name = "paper_broker::portfolio")]
    async fn portfolio(&self) -> anyhow::Result<Vec<PortfolioEntry>> {
        Ok(self.portfolio.read().clone())
    }

    async fn account_value(&self, _tag: &str) -> anyhow::Result<f64> {
        Ok(*self.account_value.read())
    }

    async fn connected(&self) -> bool {
        *self.connected.read()
    }
}
