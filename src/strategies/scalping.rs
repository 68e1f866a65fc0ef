//! Example scalping strategy
//!
//! Manages one order at a time per market: buy at the current best bid,
//! wait for the fill, then sell the same amount at a fixed percentage above
//! the buy price, wait for that fill, and buy again. Resting orders are never
//! cancelled or amended. This is a demonstration of the engine contract, not
//! a profitable algorithm.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{error, info, warn};

use crate::core::{
    Market, OrderType, StrategyConfig, StrategyError, TradingApi, TradingApiError, TradingStrategy,
};

/// Counter currency to spend on each BUY order, e.g. `20` USD.
pub const BUY_ORDER_AMOUNT_KEY: &str = "counter-currency-buy-order-amount";
/// Profit target in percent, e.g. `1` for 1%.
pub const MINIMUM_GAIN_KEY: &str = "minimum-percentage-gain";

const DECIMAL_PLACES: u32 = 8;

/// Last order placed by the strategy. In-memory only.
///
/// `order_type` is `None` until the first order is placed and never returns
/// to `None` afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderState {
    pub id: Option<String>,
    pub order_type: Option<OrderType>,
    pub price: Decimal,
    pub amount: Decimal,
}

struct Bound {
    api: Arc<dyn TradingApi>,
    market: Market,
    counter_currency_buy_order_amount: Decimal,
    minimum_percentage_gain: Decimal,
}

#[derive(Default)]
pub struct ExampleScalpingStrategy {
    bound: Option<Bound>,
    last_order: OrderState,
}

impl ExampleScalpingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_state(&self) -> &OrderState {
        &self.last_order
    }

    /// Profit target as a fraction (`1` percent becomes `0.01`).
    pub fn minimum_percentage_gain(&self) -> Option<Decimal> {
        self.bound.as_ref().map(|b| b.minimum_percentage_gain)
    }

    async fn run(bound: &Bound, last_order: &mut OrderState) -> Result<(), TradingApiError> {
        let market = &bound.market;
        let book = bound.api.get_market_orders(market.id()).await?;

        let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) else {
            warn!(
                market = %market,
                buy_orders = book.buy_orders.len(),
                sell_orders = book.sell_orders.len(),
                "Exchange returned a one-sided order book, ignoring this trade cycle"
            );
            return Ok(());
        };

        info!(market = %market, %bid, %ask, last_order = ?last_order, "Checking order status");

        match last_order.order_type {
            None => place_initial_buy(bound, last_order, bid).await,
            Some(OrderType::Buy) => after_buy(bound, last_order).await,
            Some(OrderType::Sell) => after_sell(bound, last_order, bid, ask).await,
        }
    }
}

async fn place_initial_buy(bound: &Bound, last_order: &mut OrderState, bid: Decimal) -> Result<(), TradingApiError> {
    info!(market = %bound.market, price = %bid, "No previous order, placing initial BUY");
    place_buy(bound, last_order, bid).await
}

async fn after_buy(bound: &Bound, last_order: &mut OrderState) -> Result<(), TradingApiError> {
    let market = &bound.market;

    if is_still_open(bound, last_order).await? {
        info!(
            market = %market,
            id = ?last_order.id,
            price = %last_order.price,
            "BUY order still waiting to fill, holding"
        );
        return Ok(());
    }

    info!(market = %market, id = ?last_order.id, price = %last_order.price, "BUY order filled");

    let ask = sell_price(last_order.price, bound.minimum_percentage_gain);
    info!(market = %market, price = %ask, amount = %last_order.amount, "Placing SELL");

    let id = bound
        .api
        .create_order(market.id(), OrderType::Sell, last_order.amount, ask)
        .await?;
    info!(market = %market, %id, "SELL order placed");

    last_order.id = Some(id);
    last_order.order_type = Some(OrderType::Sell);
    last_order.price = ask;
    Ok(())
}

async fn after_sell(
    bound: &Bound,
    last_order: &mut OrderState,
    bid: Decimal,
    ask: Decimal,
) -> Result<(), TradingApiError> {
    let market = &bound.market;

    if !is_still_open(bound, last_order).await? {
        info!(market = %market, id = ?last_order.id, price = %last_order.price, "SELL order filled");
        return place_buy(bound, last_order, bid).await;
    }

    match ask.cmp(&last_order.price) {
        std::cmp::Ordering::Less => info!(
            market = %market,
            %ask,
            price = %last_order.price,
            "Current ask is below our SELL price, holding"
        ),
        std::cmp::Ordering::Equal => info!(
            market = %market,
            %ask,
            price = %last_order.price,
            "Current ask equals our SELL price, holding"
        ),
        // Our order should have been taken at this ask; logged only.
        std::cmp::Ordering::Greater => error!(
            market = %market,
            %ask,
            price = %last_order.price,
            "Current ask is above our open SELL price, order should have filled"
        ),
    }
    Ok(())
}

async fn place_buy(bound: &Bound, last_order: &mut OrderState, bid: Decimal) -> Result<(), TradingApiError> {
    let market = &bound.market;
    let amount = amount_to_buy(bound).await?;

    info!(market = %market, price = %bid, %amount, "Placing BUY");
    let id = bound.api.create_order(market.id(), OrderType::Buy, amount, bid).await?;
    info!(market = %market, %id, "BUY order placed");

    last_order.id = Some(id);
    last_order.order_type = Some(OrderType::Buy);
    last_order.price = bid;
    last_order.amount = amount;
    Ok(())
}

async fn is_still_open(bound: &Bound, last_order: &OrderState) -> Result<bool, TradingApiError> {
    let open = bound.api.get_your_open_orders(bound.market.id()).await?;
    Ok(open
        .iter()
        .any(|o| Some(o.id.as_str()) == last_order.id.as_deref()))
}

async fn amount_to_buy(bound: &Bound) -> Result<Decimal, TradingApiError> {
    let market = &bound.market;
    let last_price = bound.api.get_latest_market_price(market.id()).await?;
    info!(
        market = %market,
        %last_price,
        base = market.base_currency(),
        counter = market.counter_currency(),
        "Latest trade price"
    );

    buy_amount(bound.counter_currency_buy_order_amount, last_price).ok_or_else(|| {
        TradingApiError::Exchange(format!(
            "latest trade price for {} is not positive: {last_price}",
            market.id()
        ))
    })
}

/// Base currency bought with `counter_amount` at `last_price`, rounded down
/// to 8 dp so the order never costs more than `counter_amount`.
pub fn buy_amount(counter_amount: Decimal, last_price: Decimal) -> Option<Decimal> {
    if last_price <= Decimal::ZERO {
        return None;
    }
    counter_amount
        .checked_div(last_price)
        .map(|amount| amount.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::ToZero))
}

/// Ask needed to make `gain` on `buy_price`, rounded up to 8 dp.
pub fn sell_price(buy_price: Decimal, gain: Decimal) -> Decimal {
    (buy_price + buy_price * gain).round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::AwayFromZero)
}

#[async_trait]
impl TradingStrategy for ExampleScalpingStrategy {
    fn init(&mut self, api: Arc<dyn TradingApi>, market: Market, config: &StrategyConfig) -> Result<(), StrategyError> {
        info!(market = %market, "Initialising scalping strategy");

        let counter_currency_buy_order_amount = config.require_decimal(BUY_ORDER_AMOUNT_KEY)?;
        if counter_currency_buy_order_amount <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(format!(
                "'{BUY_ORDER_AMOUNT_KEY}' must be positive, got {counter_currency_buy_order_amount}"
            )));
        }

        let percent = config.require_decimal(MINIMUM_GAIN_KEY)?;
        let minimum_percentage_gain = (percent / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);

        info!(
            market = %market,
            %counter_currency_buy_order_amount,
            %minimum_percentage_gain,
            "Scalping strategy initialised"
        );

        self.bound = Some(Bound {
            api,
            market,
            counter_currency_buy_order_amount,
            minimum_percentage_gain,
        });
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), StrategyError> {
        let Some(bound) = self.bound.as_ref() else {
            return Err(StrategyError::Internal("execute called before init".into()));
        };

        match Self::run(bound, &mut self.last_order).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_network() => {
                error!(
                    market = %bound.market,
                    error = %e,
                    last_order = ?self.last_order,
                    "Exchange network failure, waiting until next trade cycle"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    market = %bound.market,
                    error = %e,
                    last_order = ?self.last_order,
                    "Exchange API failure, telling the engine to shut down"
                );
                Err(e.into())
            }
        }
    }
}
