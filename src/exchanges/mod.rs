//! Exchange implementations - Pluggable exchange adapters

pub mod paper;

pub use paper::PaperExchange;

use std::sync::Arc;

use tracing::info;

use crate::core::{Error, Result, TradingApi, config::ExchangeConfig};

/// Build the adapter named by `exchange.adapter`.
pub fn build_adapter(config: &ExchangeConfig) -> Result<Arc<dyn TradingApi>> {
    match config.adapter.as_str() {
        "paper" => {
            let seed = config.paper.clone().unwrap_or_default();
            info!(
                exchange = %config.name,
                markets = seed.markets.len(),
                "Using paper exchange adapter"
            );
            Ok(Arc::new(PaperExchange::from_config(&config.name, &seed)))
        }
        other => Err(Error::Config(format!(
            "unknown exchange adapter '{other}' for exchange '{}'",
            config.name
        ))),
    }
}
