//! Cycle Trader - Core Library
//! Cycle-driven trading bot engine with pluggable strategies

// Public modules
pub mod core;
pub mod engine;
pub mod exchanges;
pub mod registry;
pub mod risk;
pub mod strategies;
pub mod telegram;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use crate::core::{BotConfig, Error, Result};
pub use engine::{EngineState, EngineStatus, ShutdownReason, TradingEngine};
