//! Core types - Strong typing for markets, orders and books

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Tradeable market (e.g. id "btcusd", BTC/USD)
///
/// Equality and hashing use `id` only; the other fields are descriptive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    id: String,
    name: String,
    base_currency: String,
    counter_currency: String,
}

impl Market {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_currency: impl Into<String>,
        counter_currency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_currency: base_currency.into(),
            counter_currency: counter_currency.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn counter_currency(&self) -> &str {
        &self.counter_currency
    }
}

impl PartialEq for Market {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Market {}

impl Hash for Market {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Buy => write!(f, "BUY"),
            OrderType::Sell => write!(f, "SELL"),
        }
    }
}

/// One level of an order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub total: Decimal,
}

impl MarketOrder {
    pub fn new(order_type: OrderType, price: Decimal, quantity: Decimal) -> Self {
        Self {
            order_type,
            price,
            quantity,
            total: price * quantity,
        }
    }
}

/// Order book snapshot, best price first on each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrderBook {
    pub market_id: String,
    pub buy_orders: Vec<MarketOrder>,
    pub sell_orders: Vec<MarketOrder>,
}

impl MarketOrderBook {
    pub fn new(
        market_id: impl Into<String>,
        buy_orders: Vec<MarketOrder>,
        sell_orders: Vec<MarketOrder>,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            buy_orders,
            sell_orders,
        }
    }

    /// Highest bid
    pub fn best_bid(&self) -> Option<Decimal> {
        self.buy_orders.first().map(|o| o.price)
    }

    /// Lowest ask
    pub fn best_ask(&self) -> Option<Decimal> {
        self.sell_orders.first().map(|o| o.price)
    }

    /// True when either side has no orders.
    pub fn is_one_sided(&self) -> bool {
        self.buy_orders.is_empty() || self.sell_orders.is_empty()
    }
}

/// An order of ours still resting on the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub market_id: String,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub original_quantity: Decimal,
    pub total: Decimal,
    pub creation_date: DateTime<Utc>,
}

impl OpenOrder {
    pub fn new(
        id: impl Into<String>,
        market_id: impl Into<String>,
        order_type: OrderType,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            market_id: market_id.into(),
            order_type,
            price,
            quantity,
            original_quantity: quantity,
            total: price * quantity,
            creation_date: Utc::now(),
        }
    }
}
