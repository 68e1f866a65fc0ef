//! Core traits - Seams between the engine, strategies and exchanges

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::{
    Result, StrategyConfig, StrategyError, TradingApiError,
    types::{Market, MarketOrderBook, OpenOrder, OrderType},
};

/// Exchange adapter - one implementation per exchange
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Adapter name
    fn name(&self) -> &str;

    /// Current order book for a market
    async fn get_market_orders(&self, market_id: &str) -> std::result::Result<MarketOrderBook, TradingApiError>;

    /// Our orders still resting on the book
    async fn get_your_open_orders(&self, market_id: &str) -> std::result::Result<Vec<OpenOrder>, TradingApiError>;

    /// Last trade price
    async fn get_latest_market_price(&self, market_id: &str) -> std::result::Result<Decimal, TradingApiError>;

    /// Place a limit order, returning the exchange order id
    async fn create_order(
        &self,
        market_id: &str,
        order_type: OrderType,
        amount: Decimal,
        price: Decimal,
    ) -> std::result::Result<String, TradingApiError>;

    /// Cancel an order. `Ok(false)` when the exchange no longer knows it.
    async fn cancel_order(&self, order_id: &str, market_id: &str) -> std::result::Result<bool, TradingApiError>;

    /// Available balance for a currency (zero if none held)
    async fn get_balance(&self, currency: &str) -> std::result::Result<Decimal, TradingApiError>;
}

/// Trading strategy bound to a single market.
///
/// The engine calls `execute` once per trade cycle, never concurrently with
/// itself or with any other strategy, so implementations keep plain owned
/// state without locks. Network failures should be absorbed; anything
/// returned with [`FailureKind::Fatal`](crate::core::FailureKind) stops the bot.
#[async_trait]
pub trait TradingStrategy: Send {
    /// Called once before the first cycle.
    fn init(
        &mut self,
        api: Arc<dyn TradingApi>,
        market: Market,
        config: &StrategyConfig,
    ) -> std::result::Result<(), StrategyError>;

    /// Called once per trade cycle.
    async fn execute(&mut self) -> std::result::Result<(), StrategyError>;
}

/// Out-of-band notification channel for shutdowns
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()>;
}
