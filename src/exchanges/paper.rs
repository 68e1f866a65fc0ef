//! Paper exchange - In-memory simulated venue for dry runs
//!
//! Resting orders fill once the book trades through them: a BUY fills when
//! the best ask drops to or below its price, a SELL when the best bid rises
//! to or above it. Fills are applied whenever open orders are listed.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{
    MarketOrder, MarketOrderBook, OpenOrder, OrderType, TradingApi, TradingApiError,
    config::PaperConfig,
};

#[derive(Debug, Clone)]
struct PaperMarket {
    base_currency: String,
    counter_currency: String,
    book: MarketOrderBook,
    last_price: Decimal,
}

#[derive(Default)]
struct PaperState {
    markets: HashMap<String, PaperMarket>,
    balances: HashMap<String, Decimal>,
    open_orders: Vec<OpenOrder>,
}

impl PaperState {
    fn market(&self, market_id: &str) -> Result<&PaperMarket, TradingApiError> {
        self.markets
            .get(market_id)
            .ok_or_else(|| TradingApiError::Exchange(format!("unknown market '{market_id}'")))
    }

    fn settle(&mut self, order: &OpenOrder) {
        let Some(market) = self.markets.get_mut(&order.market_id) else {
            return;
        };
        market.last_price = order.price;
        let (base, counter) = (market.base_currency.clone(), market.counter_currency.clone());
        let cost = order.quantity * order.price;

        let (credit, credit_amount, debit, debit_amount) = match order.order_type {
            OrderType::Buy => (base, order.quantity, counter, cost),
            OrderType::Sell => (counter, cost, base, order.quantity),
        };
        *self.balances.entry(credit).or_default() += credit_amount;
        *self.balances.entry(debit).or_default() -= debit_amount;
    }

    /// Fill every resting order the current books trade through.
    fn match_orders(&mut self) {
        let markets = &self.markets;
        let (filled, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open_orders)
            .into_iter()
            .partition(|order| {
                let Some(market) = markets.get(&order.market_id) else {
                    return false;
                };
                match order.order_type {
                    OrderType::Buy => market.book.best_ask().is_some_and(|ask| ask <= order.price),
                    OrderType::Sell => market.book.best_bid().is_some_and(|bid| bid >= order.price),
                }
            });
        self.open_orders = open;

        for order in &filled {
            info!(id = %order.id, market = %order.market_id, side = %order.order_type, price = %order.price, "Paper order filled");
            self.settle(order);
        }
    }
}

/// Simulated exchange adapter
pub struct PaperExchange {
    name: String,
    state: RwLock<PaperState>,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(PaperState::default()),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &PaperConfig) -> Self {
        let exchange = Self::new(name);
        for (currency, balance) in &config.balances {
            exchange.set_balance(currency, *balance);
        }
        for market in &config.markets {
            exchange.add_market(&market.market_id, &market.base_currency, &market.counter_currency);
            exchange.set_order_book(MarketOrderBook::new(
                &market.market_id,
                vec![MarketOrder::new(OrderType::Buy, market.bid, market.depth)],
                vec![MarketOrder::new(OrderType::Sell, market.ask, market.depth)],
            ));
            let last = market
                .last_price
                .unwrap_or((market.bid + market.ask) / Decimal::TWO);
            exchange.set_last_price(&market.market_id, last);
        }
        exchange
    }

    /// List a market with an empty book.
    pub fn add_market(&self, market_id: &str, base_currency: &str, counter_currency: &str) {
        self.state.write().markets.insert(
            market_id.to_string(),
            PaperMarket {
                base_currency: base_currency.to_string(),
                counter_currency: counter_currency.to_string(),
                book: MarketOrderBook::new(market_id, vec![], vec![]),
                last_price: Decimal::ZERO,
            },
        );
    }

    /// Replace the book of a listed market. Unknown markets are ignored.
    pub fn set_order_book(&self, book: MarketOrderBook) {
        if let Some(market) = self.state.write().markets.get_mut(&book.market_id) {
            market.book = book;
        }
    }

    pub fn set_last_price(&self, market_id: &str, price: Decimal) {
        if let Some(market) = self.state.write().markets.get_mut(market_id) {
            market.last_price = price;
        }
    }

    pub fn set_balance(&self, currency: &str, balance: Decimal) {
        self.state.write().balances.insert(currency.to_string(), balance);
    }

    /// Force-fill a resting order regardless of the book.
    pub fn fill_order(&self, order_id: &str) -> bool {
        let mut state = self.state.write();
        let Some(pos) = state.open_orders.iter().position(|o| o.id == order_id) else {
            return false;
        };
        let order = state.open_orders.remove(pos);
        state.settle(&order);
        true
    }

    pub fn open_order_count(&self) -> usize {
        self.state.read().open_orders.len()
    }
}

#[async_trait]
impl TradingApi for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_market_orders(&self, market_id: &str) -> Result<MarketOrderBook, TradingApiError> {
        Ok(self.state.read().market(market_id)?.book.clone())
    }

    async fn get_your_open_orders(&self, market_id: &str) -> Result<Vec<OpenOrder>, TradingApiError> {
        let mut state = self.state.write();
        state.market(market_id)?;
        state.match_orders();
        Ok(state
            .open_orders
            .iter()
            .filter(|o| o.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn get_latest_market_price(&self, market_id: &str) -> Result<Decimal, TradingApiError> {
        Ok(self.state.read().market(market_id)?.last_price)
    }

    async fn create_order(
        &self,
        market_id: &str,
        order_type: OrderType,
        amount: Decimal,
        price: Decimal,
    ) -> Result<String, TradingApiError> {
        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(TradingApiError::Exchange(format!(
                "invalid order: amount {amount} @ {price}"
            )));
        }

        let mut state = self.state.write();
        state.market(market_id)?;
        let id = format!("paper-{}", Uuid::new_v4());
        debug!(%id, market = %market_id, side = %order_type, %amount, %price, "Paper order accepted");
        state
            .open_orders
            .push(OpenOrder::new(&id, market_id, order_type, price, amount));
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str, market_id: &str) -> Result<bool, TradingApiError> {
        let mut state = self.state.write();
        let before = state.open_orders.len();
        state
            .open_orders
            .retain(|o| !(o.id == order_id && o.market_id == market_id));
        Ok(state.open_orders.len() != before)
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, TradingApiError> {
        Ok(self
            .state
            .read()
            .balances
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}
