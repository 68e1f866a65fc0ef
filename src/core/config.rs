//! Configuration - YAML-backed, validated once at start-up
//!
//! The whole bot is described by a single YAML document (see
//! `config/bot.yaml`). It is read-only for the lifetime of the process;
//! changing it requires a restart.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::core::{Error, Result, StrategyError, types::Market};

/// Top-level config file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub engine: EngineConfig,
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub strategies: Vec<StrategyDefinition>,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub bot_id: String,
    pub bot_name: String,
    /// Currency whose balance is watched by the emergency stop
    #[serde(default)]
    pub emergency_stop_currency: String,
    /// Stop the bot when the balance drops below this. Zero disables the check.
    #[serde(default)]
    pub emergency_stop_balance: Decimal,
    /// Seconds between trade cycles
    pub trade_cycle_interval: u64,
}

impl EngineConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.trade_cycle_interval)
    }

    fn validate(&self) -> Result<()> {
        if self.bot_id.trim().is_empty() {
            return Err(Error::Config("engine.bot_id must not be empty".into()));
        }
        if self.bot_name.trim().is_empty() {
            return Err(Error::Config("engine.bot_name must not be empty".into()));
        }
        if self.trade_cycle_interval < 1 {
            return Err(Error::Config(
                "engine.trade_cycle_interval must be at least 1 second".into(),
            ));
        }
        if self.emergency_stop_balance.is_sign_negative() {
            return Err(Error::Config(format!(
                "engine.emergency_stop_balance must not be negative, got {}",
                self.emergency_stop_balance
            )));
        }
        if !self.emergency_stop_balance.is_zero() && self.emergency_stop_currency.trim().is_empty() {
            return Err(Error::Config(
                "engine.emergency_stop_currency is required when emergency_stop_balance is set".into(),
            ));
        }
        Ok(())
    }
}

/// Market definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Exchange-specific market id
    pub id: String,
    pub name: String,
    pub base_currency: String,
    pub counter_currency: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Id of the strategy definition that trades this market
    pub trading_strategy_id: String,
}

fn default_enabled() -> bool {
    true
}

impl MarketConfig {
    pub fn to_market(&self) -> Market {
        Market::new(&self.id, &self.name, &self.base_currency, &self.counter_currency)
    }
}

/// Strategy definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Implementation name in the strategy registry
    pub kind: String,
    #[serde(default, deserialize_with = "scalar_map")]
    pub config_items: BTreeMap<String, String>,
}

impl StrategyDefinition {
    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig::new(self.config_items.clone())
    }
}

/// Accept strings, numbers and bools as config item values.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "config item '{key}' must be a scalar, got {other:?}"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// Per-strategy key/value config, validated by the strategy itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    items: BTreeMap<String, String>,
}

impl StrategyConfig {
    pub fn new(items: BTreeMap<String, String>) -> Self {
        Self { items }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Mandatory item
    pub fn require(&self, key: &str) -> std::result::Result<&str, StrategyError> {
        self.get(key)
            .ok_or_else(|| StrategyError::InvalidConfig(format!("mandatory config item '{key}' is missing")))
    }

    /// Mandatory decimal item
    pub fn require_decimal(&self, key: &str) -> std::result::Result<Decimal, StrategyError> {
        let raw = self.require(key)?;
        raw.trim().parse::<Decimal>().map_err(|e| {
            StrategyError::InvalidConfig(format!("config item '{key}' is not a number ('{raw}'): {e}"))
        })
    }

    pub fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StrategyConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Exchange adapter selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    /// Adapter id (currently only `paper`)
    pub adapter: String,
    #[serde(default)]
    pub paper: Option<PaperConfig>,
}

/// Seed data for the simulated exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default)]
    pub balances: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub markets: Vec<PaperMarketConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperMarketConfig {
    pub market_id: String,
    pub base_currency: String,
    pub counter_currency: String,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Defaults to the mid price
    #[serde(default)]
    pub last_price: Option<Decimal>,
    /// Quantity quoted on each side
    #[serde(default = "default_depth")]
    pub depth: Decimal,
}

fn default_depth() -> Decimal {
    Decimal::ONE
}

/// Alert channels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN if not provided)
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Chats that receive alerts
    #[serde(default)]
    pub chat_ids: Vec<i64>,
}

impl BotConfig {
    /// Load and validate from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: BotConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        if self.exchange.adapter.trim().is_empty() {
            return Err(Error::Config("exchange.adapter must not be empty".into()));
        }

        let mut strategy_ids = HashSet::new();
        for strategy in &self.strategies {
            if !strategy_ids.insert(strategy.id.as_str()) {
                return Err(Error::Config(format!("duplicate strategy id '{}'", strategy.id)));
            }
        }

        let mut market_ids = HashSet::new();
        for market in &self.markets {
            if market.id.trim().is_empty() {
                return Err(Error::Config(format!("market '{}' has an empty id", market.name)));
            }
            if !market_ids.insert(market.id.as_str()) {
                return Err(Error::Config(format!("duplicate market id '{}'", market.id)));
            }
            if !strategy_ids.contains(market.trading_strategy_id.as_str()) {
                return Err(Error::Config(format!(
                    "market '{}' references unknown strategy '{}'",
                    market.id, market.trading_strategy_id
                )));
            }
        }

        Ok(())
    }

    /// Get strategy definition by id
    pub fn strategy(&self, id: &str) -> Option<&StrategyDefinition> {
        self.strategies.iter().find(|s| s.id == id)
    }
}
