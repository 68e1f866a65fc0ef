use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use cycle_trader::{
    BotConfig, ShutdownReason, TradingEngine, exchanges, registry::{StrategyRegistry, bind_markets},
    telegram::TelegramAlerter,
};

const DEFAULT_CONFIG: &str = "config/bot.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 1. Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cycle_trader=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("🦀 Cycle Trader starting...");

    // 2. Configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = BotConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    tracing::info!("📋 Loaded config from {}", config_path);

    // 3. Exchange adapter + strategies
    let api = exchanges::build_adapter(&config.exchange)?;
    let registry = StrategyRegistry::with_builtin_strategies();
    let bindings = bind_markets(&config, &registry, api.clone())
        .context("initialising strategies")?;
    tracing::info!("⏳ Bound {} market(s) on {}", bindings.len(), api.name());

    let mut engine = TradingEngine::new(config.engine.clone(), api, bindings);
    if let Some(alerter) = TelegramAlerter::from_config(&config.alerts)? {
        engine = engine.with_alerter(Arc::new(alerter));
    }

    // 4. Operator stop on Ctrl-C
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Stop requested, finishing current cycle...");
            let _ = stop_tx.send(true);
        }
    });

    // 5. Run until stopped
    match engine.run(stop_rx).await {
        ShutdownReason::OperatorRequested => {
            tracing::info!("✅ Cycle Trader stopped");
            Ok(())
        }
        reason => {
            tracing::error!("❌ Cycle Trader shut down: {}", reason);
            std::process::exit(1);
        }
    }
}
