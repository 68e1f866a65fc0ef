//! Error handling - Failure taxonomy shared by adapters, strategies and the engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Start-up and plumbing errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP errors (alert delivery)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Strategy failed to initialise
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Alert delivery rejected
    #[error("Alert error: {0}")]
    Alert(String),
}

/// Errors raised by an exchange adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradingApiError {
    /// Timeout, connection reset and friends. Safe to retry next cycle.
    #[error("exchange network failure: {0}")]
    Network(String),

    /// Malformed response, exchange-reported error or unexpected API state.
    #[error("exchange API failure: {0}")]
    Exchange(String),
}

impl TradingApiError {
    pub fn is_network(&self) -> bool {
        matches!(self, TradingApiError::Network(_))
    }
}

/// How the engine reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Log and carry on with the next market / cycle
    Transient,
    /// Stop the bot
    Fatal,
}

/// Errors crossing the strategy boundary.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    /// Missing or invalid strategy config item.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Strategy-reported temporary failure.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Adapter failure the strategy chose not to absorb.
    #[error(transparent)]
    TradingApi(#[from] TradingApiError),

    /// Strategy bug or broken invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StrategyError {
    /// Single classification point for the engine.
    pub fn kind(&self) -> FailureKind {
        match self {
            StrategyError::Transient(_) => FailureKind::Transient,
            StrategyError::TradingApi(e) if e.is_network() => FailureKind::Transient,
            _ => FailureKind::Fatal,
        }
    }
}
