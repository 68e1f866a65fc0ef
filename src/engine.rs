//! Trading engine - Cycle scheduler and top-level state machine
//!
//! One task drives everything: every `trade_cycle_interval` seconds the
//! emergency stop guard runs, then each bound market's strategy is executed
//! once, in configuration order. Transient strategy failures are logged and
//! the cycle moves on; fatal ones stop the bot. Nothing here resumes after a
//! fatal failure: an operator has to restart the process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::{Alerter, EngineConfig, FailureKind, StrategyError, TradingApi, TradingApiError};
use crate::registry::MarketBinding;
use crate::risk::{EmergencyStopGuard, GuardOutcome};

/// Engine lifecycle. `Stopped` and `CriticalError` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopped,
    CriticalError,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Stopped | EngineState::CriticalError)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "IDLE"),
            EngineState::Running => write!(f, "RUNNING"),
            EngineState::Stopped => write!(f, "STOPPED"),
            EngineState::CriticalError => write!(f, "CRITICAL_ERROR"),
        }
    }
}

/// Why the engine stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Stop flag raised by the host process.
    OperatorRequested,
    /// Watched balance fell below the configured floor.
    EmergencyStop {
        currency: String,
        balance: Decimal,
        threshold: Decimal,
    },
    /// A strategy returned a fatal error.
    StrategyFailure { market_id: String, error: String },
    /// The emergency stop balance query returned an exchange error.
    BalanceCheckFailed { error: String },
}

impl ShutdownReason {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ShutdownReason::OperatorRequested)
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::OperatorRequested => write!(f, "stop requested by operator"),
            ShutdownReason::EmergencyStop {
                currency,
                balance,
                threshold,
            } => write!(
                f,
                "emergency stop: {currency} balance {balance} is below {threshold}"
            ),
            ShutdownReason::StrategyFailure { market_id, error } => {
                write!(f, "strategy for market {market_id} failed: {error}")
            }
            ShutdownReason::BalanceCheckFailed { error } => {
                write!(f, "emergency stop balance check failed: {error}")
            }
        }
    }
}

/// Read-only snapshot for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub bot_id: String,
    pub bot_name: String,
    pub state: EngineState,
    pub cycles_completed: u64,
    pub last_cycle_started: Option<DateTime<Utc>>,
    pub shutdown_reason: Option<ShutdownReason>,
}

enum CycleOutcome {
    Completed,
    Shutdown(ShutdownReason),
}

pub struct TradingEngine {
    config: EngineConfig,
    api: Arc<dyn TradingApi>,
    guard: EmergencyStopGuard,
    bindings: Vec<MarketBinding>,
    alerter: Option<Arc<dyn Alerter>>,
    state: EngineState,
    status_tx: watch::Sender<EngineStatus>,
}

impl TradingEngine {
    pub fn new(config: EngineConfig, api: Arc<dyn TradingApi>, bindings: Vec<MarketBinding>) -> Self {
        let guard = EmergencyStopGuard::new(&config.emergency_stop_currency, config.emergency_stop_balance);
        let (status_tx, _) = watch::channel(EngineStatus {
            bot_id: config.bot_id.clone(),
            bot_name: config.bot_name.clone(),
            state: EngineState::Idle,
            cycles_completed: 0,
            last_cycle_started: None,
            shutdown_reason: None,
        });

        Self {
            config,
            api,
            guard,
            bindings,
            alerter: None,
            state: EngineState::Idle,
            status_tx,
        }
    }

    /// Notify through `alerter` when shutting down on a failure.
    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Subscribe to status snapshots.
    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    /// Drive trade cycles until the operator stops the bot or a fatal
    /// failure occurs. The first cycle starts immediately.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> ShutdownReason {
        info!(
            bot_id = %self.config.bot_id,
            bot_name = %self.config.bot_name,
            exchange = self.api.name(),
            markets = self.bindings.len(),
            interval_secs = self.config.trade_cycle_interval,
            emergency_stop = self.guard.is_enabled(),
            "Starting trading engine"
        );
        self.transition(EngineState::Running);

        let interval = self.config.cycle_interval();
        let reason = loop {
            if *shutdown_rx.borrow_and_update() {
                break ShutdownReason::OperatorRequested;
            }

            match self.run_cycle().await {
                CycleOutcome::Completed => {}
                CycleOutcome::Shutdown(reason) => break reason,
            }

            if wait_for_next_cycle(interval, &mut shutdown_rx).await {
                break ShutdownReason::OperatorRequested;
            }
        };

        self.shutdown(reason).await
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        let started = Utc::now();
        self.status_tx.send_modify(|s| s.last_cycle_started = Some(started));
        debug!("*** Starting next trade cycle ***");

        match self.guard.check(self.api.as_ref()).await {
            Ok(GuardOutcome::Tripped { balance, threshold }) => {
                return CycleOutcome::Shutdown(ShutdownReason::EmergencyStop {
                    currency: self.guard.currency().to_string(),
                    balance,
                    threshold,
                });
            }
            Ok(_) => {}
            Err(e) => return CycleOutcome::Shutdown(balance_check_failed(e)),
        }

        for binding in self.bindings.iter_mut() {
            let market_id = binding.market.id();
            debug!(market = %market_id, strategy = %binding.strategy_id, "Executing strategy");

            let Err(e) = binding.strategy.execute().await else {
                continue;
            };

            match e.kind() {
                FailureKind::Transient => {
                    warn!(market = %market_id, error = %e, "Strategy failed transiently, retrying next cycle");
                }
                FailureKind::Fatal => {
                    return CycleOutcome::Shutdown(strategy_failure(market_id, &e));
                }
            }
        }

        self.status_tx.send_modify(|s| s.cycles_completed += 1);
        CycleOutcome::Completed
    }

    async fn shutdown(mut self, reason: ShutdownReason) -> ShutdownReason {
        let state = match reason {
            ShutdownReason::EmergencyStop { .. } => EngineState::CriticalError,
            _ => EngineState::Stopped,
        };
        self.transition(state);
        self.status_tx
            .send_modify(|s| s.shutdown_reason = Some(reason.clone()));

        if !reason.is_failure() {
            info!(bot_id = %self.config.bot_id, "Trading engine stopped by operator");
            return reason;
        }

        error!(
            bot_id = %self.config.bot_id,
            state = %state,
            reason = %reason,
            "Trading engine shut down, manual intervention required"
        );

        if let Some(alerter) = &self.alerter {
            let subject = format!("CRITICAL: {} ({}) shut down", self.config.bot_name, self.config.bot_id);
            let body = format!(
                "{} stopped trading at {}.\nState: {}\nReason: {}\nThe bot will not restart on its own.",
                self.config.bot_name,
                Utc::now().to_rfc3339(),
                state,
                reason
            );
            if let Err(e) = alerter.send_alert(&subject, &body).await {
                error!(error = %e, "Failed to send shutdown alert");
            }
        }

        reason
    }

    fn transition(&mut self, next: EngineState) {
        info!(from = %self.state, to = %next, "Engine state change");
        self.state = next;
        self.status_tx.send_modify(|s| s.state = next);
    }
}

fn strategy_failure(market_id: &str, e: &StrategyError) -> ShutdownReason {
    ShutdownReason::StrategyFailure {
        market_id: market_id.to_string(),
        error: e.to_string(),
    }
}

fn balance_check_failed(e: TradingApiError) -> ShutdownReason {
    ShutdownReason::BalanceCheckFailed { error: e.to_string() }
}

/// Sleep one full interval. Returns true if the stop flag was raised.
async fn wait_for_next_cycle(interval: std::time::Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can stop us any more.
                    tokio::time::sleep_until(deadline).await;
                    return false;
                }
                if *shutdown_rx.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Market, StrategyConfig, TradingStrategy};
    use crate::testing::ScriptedApi;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Logs each call through the api so guard and strategy calls share one
    /// ordered log, and replays scripted results.
    struct ProbeStrategy {
        api: Option<Arc<dyn TradingApi>>,
        market: Option<Market>,
        results: VecDeque<Result<(), StrategyError>>,
        in_flight: Arc<AtomicBool>,
        overlap: Arc<AtomicBool>,
        stop_after: Option<(usize, watch::Sender<bool>)>,
        starts: Arc<Mutex<Vec<Instant>>>,
        calls: usize,
    }

    impl ProbeStrategy {
        fn new(results: Vec<Result<(), StrategyError>>, h: &Harness) -> Self {
            Self {
                api: None,
                market: None,
                results: results.into(),
                in_flight: h.in_flight.clone(),
                overlap: h.overlap.clone(),
                stop_after: None,
                starts: h.starts.clone(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl TradingStrategy for ProbeStrategy {
        fn init(&mut self, api: Arc<dyn TradingApi>, market: Market, _: &StrategyConfig) -> Result<(), StrategyError> {
            self.api = Some(api);
            self.market = Some(market);
            Ok(())
        }

        async fn execute(&mut self) -> Result<(), StrategyError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlap.store(true, Ordering::SeqCst);
            }
            self.calls += 1;
            self.starts.lock().push(Instant::now());

            let api = self.api.clone().unwrap();
            let market = self.market.clone().unwrap();
            let _ = api.get_your_open_orders(market.id()).await;
            tokio::time::sleep(Duration::from_millis(10)).await;

            if let Some((n, tx)) = &self.stop_after {
                if self.calls >= *n {
                    let _ = tx.send(true);
                }
            }

            self.in_flight.store(false, Ordering::SeqCst);
            self.results.pop_front().unwrap_or(Ok(()))
        }
    }

    struct Harness {
        api: Arc<ScriptedApi>,
        in_flight: Arc<AtomicBool>,
        overlap: Arc<AtomicBool>,
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                api: Arc::new(ScriptedApi::new()),
                in_flight: Arc::new(AtomicBool::new(false)),
                overlap: Arc::new(AtomicBool::new(false)),
                starts: Arc::new(Mutex::new(vec![])),
            }
        }

        fn probe(&self, results: Vec<Result<(), StrategyError>>) -> ProbeStrategy {
            ProbeStrategy::new(results, self)
        }

        fn bind(&self, id: &str, mut strategy: ProbeStrategy) -> MarketBinding {
            let market = Market::new(id, id.to_uppercase(), "BTC", "USD");
            strategy
                .init(self.api.clone(), market.clone(), &StrategyConfig::default())
                .unwrap();
            MarketBinding {
                market,
                strategy_id: "probe".into(),
                strategy: Box::new(strategy),
            }
        }

        fn engine(&self, stop_balance: Decimal, bindings: Vec<MarketBinding>) -> TradingEngine {
            let config = EngineConfig {
                bot_id: "test-bot".into(),
                bot_name: "Test Bot".into(),
                emergency_stop_currency: "BTC".into(),
                emergency_stop_balance: stop_balance,
                trade_cycle_interval: 60,
            };
            TradingEngine::new(config, self.api.clone(), bindings)
        }
    }

    struct RecordingAlerter(Mutex<Vec<String>>);

    #[async_trait]
    impl Alerter for RecordingAlerter {
        async fn send_alert(&self, subject: &str, _body: &str) -> crate::core::Result<()> {
            self.0.lock().push(subject.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_blocks_strategies() {
        let h = Harness::new();
        h.api.set_balance("BTC", dec!(0.5));
        let engine = h.engine(dec!(1.0), vec![h.bind("m1", h.probe(vec![]))]);
        let status = engine.status();
        let (_tx, rx) = watch::channel(false);

        let reason = engine.run(rx).await;

        assert_eq!(
            reason,
            ShutdownReason::EmergencyStop {
                currency: "BTC".into(),
                balance: dec!(0.5),
                threshold: dec!(1.0),
            }
        );
        assert_eq!(h.api.calls(), ["get_balance:BTC"]);
        let status = status.borrow();
        assert_eq!(status.state, EngineState::CriticalError);
        assert_eq!(status.cycles_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_runs_before_strategies_each_cycle() {
        let h = Harness::new();
        h.api.set_balance("BTC", dec!(5));
        let (tx, rx) = watch::channel(false);
        let mut last = h.probe(vec![]);
        last.stop_after = Some((2, tx));
        let engine = h.engine(dec!(1), vec![h.bind("m1", h.probe(vec![])), h.bind("m2", last)]);

        let reason = engine.run(rx).await;

        assert_eq!(reason, ShutdownReason::OperatorRequested);
        assert_eq!(
            h.api.calls(),
            [
                "get_balance:BTC",
                "get_your_open_orders:m1",
                "get_your_open_orders:m2",
                "get_balance:BTC",
                "get_your_open_orders:m1",
                "get_your_open_orders:m2",
            ]
        );
        assert!(!h.overlap.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_skips_remaining_markets() {
        let h = Harness::new();
        let fatal = StrategyError::from(TradingApiError::Exchange("unexpected response".into()));
        let engine = h.engine(
            Decimal::ZERO,
            vec![h.bind("m1", h.probe(vec![Err(fatal)])), h.bind("m2", h.probe(vec![]))],
        );
        let alerter = Arc::new(RecordingAlerter(Mutex::new(vec![])));
        let engine = engine.with_alerter(alerter.clone());
        let status = engine.status();
        let (_tx, rx) = watch::channel(false);

        let reason = engine.run(rx).await;

        assert!(matches!(&reason, ShutdownReason::StrategyFailure { market_id, .. } if market_id == "m1"));
        assert_eq!(h.api.calls(), ["get_your_open_orders:m1"]);
        assert_eq!(status.borrow().state, EngineState::Stopped);
        assert_eq!(alerter.0.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_continues() {
        let h = Harness::new();
        let (tx, rx) = watch::channel(false);
        let flaky = h.probe(vec![
            Err(StrategyError::from(TradingApiError::Network("timeout".into()))),
            Err(StrategyError::Transient("busy".into())),
        ]);
        let mut last = h.probe(vec![]);
        last.stop_after = Some((3, tx));
        let engine = h.engine(Decimal::ZERO, vec![h.bind("m1", flaky), h.bind("m2", last)]);
        let status = engine.status();

        let reason = engine.run(rx).await;

        assert_eq!(reason, ShutdownReason::OperatorRequested);
        let calls = h.api.calls();
        assert_eq!(calls.iter().filter(|c| c.ends_with("m1")).count(), 3);
        assert_eq!(calls.iter().filter(|c| c.ends_with("m2")).count(), 3);
        assert_eq!(status.borrow().cycles_completed, 3);
        assert_eq!(status.borrow().state, EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_on_balance_check_is_tolerated() {
        let h = Harness::new();
        h.api.set_balance("BTC", dec!(5));
        h.api.fail_next("get_balance", TradingApiError::Network("reset".into()));
        let (tx, rx) = watch::channel(false);
        let mut probe = h.probe(vec![]);
        probe.stop_after = Some((1, tx));
        let engine = h.engine(dec!(1), vec![h.bind("m1", probe)]);

        assert_eq!(engine.run(rx).await, ShutdownReason::OperatorRequested);
        assert_eq!(h.api.calls(), ["get_balance:BTC", "get_your_open_orders:m1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_failure_on_balance_check_stops() {
        let h = Harness::new();
        h.api.fail_next("get_balance", TradingApiError::Exchange("bad auth".into()));
        let engine = h.engine(dec!(1), vec![h.bind("m1", h.probe(vec![]))]);
        let (_tx, rx) = watch::channel(false);

        let reason = engine.run(rx).await;

        assert!(matches!(reason, ShutdownReason::BalanceCheckFailed { .. }));
        assert!(reason.is_failure());
        assert_eq!(h.api.calls(), ["get_balance:BTC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_cycles() {
        let h = Harness::new();
        let (tx, rx) = watch::channel(false);
        let mut probe = h.probe(vec![]);
        probe.stop_after = Some((3, tx));
        let engine = h.engine(Decimal::ZERO, vec![h.bind("m1", probe)]);

        assert_eq!(engine.run(rx).await, ShutdownReason::OperatorRequested);

        // each execute takes 10ms, then the engine waits the full 60s
        let starts = h.starts.lock().clone();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(60) + Duration::from_millis(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_cycle() {
        let h = Harness::new();
        let engine = h.engine(Decimal::ZERO, vec![h.bind("m1", h.probe(vec![]))]);
        let (_tx, rx) = watch::channel(true);

        assert_eq!(engine.run(rx).await, ShutdownReason::OperatorRequested);
        assert!(h.api.calls().is_empty());
    }

    #[test]
    fn test_state_helpers() {
        assert!(!EngineState::Idle.is_terminal());
        assert!(!EngineState::Running.is_terminal());
        assert!(EngineState::Stopped.is_terminal());
        assert!(EngineState::CriticalError.is_terminal());
        assert!(!ShutdownReason::OperatorRequested.is_failure());
    }
}
