//! Market registry - Resolves configured markets to initialised strategies

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::core::{BotConfig, Error, Market, Result, TradingApi, TradingStrategy};
use crate::strategies::ExampleScalpingStrategy;

/// Builds a fresh, uninitialised strategy instance.
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn TradingStrategy> + Send + Sync>;

/// Implementation name -> factory
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every bundled strategy.
    pub fn with_builtin_strategies() -> Self {
        let mut registry = Self::new();
        registry.register("example-scalping", || Box::new(ExampleScalpingStrategy::new()));
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn TradingStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn create(&self, kind: &str) -> Option<Box<dyn TradingStrategy>> {
        self.factories.get(kind).map(|factory| factory())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// An enabled market and the strategy instance that trades it.
pub struct MarketBinding {
    pub market: Market,
    pub strategy_id: String,
    pub strategy: Box<dyn TradingStrategy>,
}

impl std::fmt::Debug for MarketBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketBinding")
            .field("market", &self.market)
            .field("strategy_id", &self.strategy_id)
            .finish_non_exhaustive()
    }
}

/// Create and initialise one strategy per enabled market, in configuration
/// order. Any failure here is fatal and happens before the engine starts.
pub fn bind_markets(
    config: &BotConfig,
    registry: &StrategyRegistry,
    api: Arc<dyn TradingApi>,
) -> Result<Vec<MarketBinding>> {
    let mut bindings = Vec::new();

    for market_config in &config.markets {
        if !market_config.enabled {
            info!(market = %market_config.id, "Market disabled, skipping");
            continue;
        }

        let definition = config.strategy(&market_config.trading_strategy_id).ok_or_else(|| {
            Error::Config(format!(
                "market '{}' references unknown strategy '{}'",
                market_config.id, market_config.trading_strategy_id
            ))
        })?;

        let mut strategy = registry.create(&definition.kind).ok_or_else(|| {
            Error::Config(format!(
                "strategy '{}' uses unknown implementation '{}'",
                definition.id, definition.kind
            ))
        })?;

        let market = market_config.to_market();
        strategy.init(api.clone(), market.clone(), &definition.strategy_config())?;

        info!(market = %market.id(), strategy = %definition.id, kind = %definition.kind, "Market bound");
        bindings.push(MarketBinding {
            market,
            strategy_id: definition.id.clone(),
            strategy,
        });
    }

    Ok(bindings)
}
