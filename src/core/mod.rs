//! Core module - Common types, traits, configuration and error handling

pub mod error;
pub mod types;
pub mod traits;
pub mod config;

pub use error::{Error, FailureKind, Result, StrategyError, TradingApiError};
pub use types::*;
pub use traits::*;
pub use config::{BotConfig, EngineConfig, StrategyConfig};
