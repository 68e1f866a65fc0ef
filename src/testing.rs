//! Scripted exchange double for unit tests

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::{MarketOrder, MarketOrderBook, OpenOrder, OrderType, TradingApi, TradingApiError};

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub id: String,
    pub market_id: String,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Decimal,
}

#[derive(Default)]
struct Script {
    books: HashMap<String, MarketOrderBook>,
    last_prices: HashMap<String, Decimal>,
    open_orders: HashMap<String, Vec<OpenOrder>>,
    balances: HashMap<String, Decimal>,
    failures: HashMap<String, VecDeque<TradingApiError>>,
    created: Vec<CreatedOrder>,
    calls: Vec<String>,
    next_id: u64,
}

/// In-memory [`TradingApi`] with error injection and a call log.
#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-level book with the given best bid and ask.
    pub fn set_book(&self, market_id: &str, bid: Decimal, ask: Decimal) {
        let book = MarketOrderBook::new(
            market_id,
            vec![MarketOrder::new(OrderType::Buy, bid, Decimal::ONE)],
            vec![MarketOrder::new(OrderType::Sell, ask, Decimal::ONE)],
        );
        self.set_order_book(book);
    }

    pub fn set_order_book(&self, book: MarketOrderBook) {
        self.script.lock().books.insert(book.market_id.clone(), book);
    }

    pub fn set_last_price(&self, market_id: &str, price: Decimal) {
        self.script.lock().last_prices.insert(market_id.to_string(), price);
    }

    pub fn set_balance(&self, currency: &str, balance: Decimal) {
        self.script.lock().balances.insert(currency.to_string(), balance);
    }

    /// Make the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &str, error: TradingApiError) {
        self.script
            .lock()
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Drop every open order in a market, as if all of them had filled.
    pub fn fill_all(&self, market_id: &str) {
        self.script.lock().open_orders.remove(market_id);
    }

    pub fn created_orders(&self) -> Vec<CreatedOrder> {
        self.script.lock().created.clone()
    }

    /// `method:arg` entries in call order
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    fn enter(&self, method: &str, arg: &str) -> Result<(), TradingApiError> {
        let mut script = self.script.lock();
        script.calls.push(format!("{method}:{arg}"));
        match script.failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TradingApi for ScriptedApi {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_market_orders(&self, market_id: &str) -> Result<MarketOrderBook, TradingApiError> {
        self.enter("get_market_orders", market_id)?;
        Ok(self
            .script
            .lock()
            .books
            .get(market_id)
            .cloned()
            .unwrap_or_else(|| MarketOrderBook::new(market_id, vec![], vec![])))
    }

    async fn get_your_open_orders(&self, market_id: &str) -> Result<Vec<OpenOrder>, TradingApiError> {
        self.enter("get_your_open_orders", market_id)?;
        Ok(self
            .script
            .lock()
            .open_orders
            .get(market_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_latest_market_price(&self, market_id: &str) -> Result<Decimal, TradingApiError> {
        self.enter("get_latest_market_price", market_id)?;
        self.script
            .lock()
            .last_prices
            .get(market_id)
            .copied()
            .ok_or_else(|| TradingApiError::Exchange(format!("no last price for {market_id}")))
    }

    async fn create_order(
        &self,
        market_id: &str,
        order_type: OrderType,
        amount: Decimal,
        price: Decimal,
    ) -> Result<String, TradingApiError> {
        self.enter("create_order", market_id)?;
        let mut script = self.script.lock();
        script.next_id += 1;
        let id = format!("order-{}", script.next_id);
        script.created.push(CreatedOrder {
            id: id.clone(),
            market_id: market_id.to_string(),
            order_type,
            amount,
            price,
        });
        script
            .open_orders
            .entry(market_id.to_string())
            .or_default()
            .push(OpenOrder::new(&id, market_id, order_type, price, amount));
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str, market_id: &str) -> Result<bool, TradingApiError> {
        self.enter("cancel_order", order_id)?;
        let mut script = self.script.lock();
        let Some(orders) = script.open_orders.get_mut(market_id) else {
            return Ok(false);
        };
        let before = orders.len();
        orders.retain(|o| o.id != order_id);
        Ok(orders.len() != before)
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, TradingApiError> {
        self.enter("get_balance", currency)?;
        Ok(self
            .script
            .lock()
            .balances
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}
