//! Automation scheduler: drives the research and trading pipeline on three
//! periodic jobs (data refresh, trading cycle, risk rebalance).
//!
//! Fault handling is layered. A failing asset never blocks the others in a
//! cycle; a failing cycle never stops the scheduler; only configuration
//! errors at startup are fatal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AutomationConfig;
use crate::domain::entities::asset::Asset;
use crate::domain::errors::PipelineError;
use crate::domain::services::analysis_engine::{AnalysisEngine, UniverseSnapshot};
use crate::domain::services::indicators;
use crate::domain::services::risk_manager::{LiquidationPolicy, OrderIntent, RiskManager};
use crate::domain::services::trading_executor::TradingExecutor;
use crate::infrastructure::market_data::{DataProvider, MarketDataStore};
use crate::infrastructure::notifier::{Notification, Notifier};

/// History samples loaded per asset for each analysis.
const HISTORY_LIMIT: usize = 200;
/// Window (in returns) for the realized volatility feeding VaR and the
/// black-swan check.
const VOLATILITY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "STOPPED"),
            SchedulerState::Starting => write!(f, "STARTING"),
            SchedulerState::Running => write!(f, "RUNNING"),
            SchedulerState::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Counters for one trading cycle, reported in the cycle summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleOutcome {
    pub analyzed: usize,
    pub executed: usize,
    pub rejected: usize,
    pub failures: usize,
    pub exits: usize,
}

pub struct AutomationScheduler {
    config: AutomationConfig,
    engine: AnalysisEngine,
    risk: Mutex<RiskManager>,
    executor: Mutex<TradingExecutor>,
    store: Arc<dyn MarketDataStore>,
    provider: Arc<dyn DataProvider>,
    notifier: Arc<dyn Notifier>,
    state: std::sync::Mutex<SchedulerState>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutomationScheduler {
    pub fn new(
        config: AutomationConfig,
        engine: AnalysisEngine,
        risk: RiskManager,
        executor: TradingExecutor,
        store: Arc<dyn MarketDataStore>,
        provider: Arc<dyn DataProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        AutomationScheduler {
            config,
            engine,
            risk: Mutex::new(risk),
            executor: Mutex::new(executor),
            store,
            provider,
            notifier,
            state: std::sync::Mutex::new(SchedulerState::Stopped),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SchedulerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*state, to = %next, "scheduler state transition");
        *state = next;
    }

    /// Start the periodic jobs. No-op (with a warning) unless currently
    /// stopped.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SchedulerState::Stopped {
                warn!(state = %*state, "start ignored, scheduler not stopped");
                return;
            }
            *state = SchedulerState::Starting;
        }

        let _ = self.shutdown.send(false);
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move { scheduler.run_loop().await });
        *self.handle.lock().await = Some(task);

        self.set_state(SchedulerState::Running);
        info!(
            refresh_min = self.config.data_refresh_interval_minutes,
            analysis_min = self.config.analysis_interval_minutes,
            rebalance_h = self.config.rebalance_interval_hours,
            "automation scheduler started"
        );
    }

    /// Stop the scheduler, letting an in-flight cycle finish. Idempotent:
    /// stopping a stopped (or already stopping) scheduler is a no-op.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                SchedulerState::Stopped | SchedulerState::Stopping => {
                    debug!(state = %*state, "stop ignored");
                    return;
                }
                _ => *state = SchedulerState::Stopping,
            }
        }

        let _ = self.shutdown.send(true);
        let task = self.handle.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler task panicked");
            }
        }
        self.set_state(SchedulerState::Stopped);
        info!("automation scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        let mut refresh_interval = tokio::time::interval(Duration::from_secs(
            self.config.data_refresh_interval_minutes * 60,
        ));
        let mut analysis_interval = tokio::time::interval(Duration::from_secs(
            self.config.analysis_interval_minutes * 60,
        ));
        let mut rebalance_interval = tokio::time::interval(Duration::from_secs(
            self.config.rebalance_interval_hours * 3600,
        ));
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = refresh_interval.tick() => {
                    if let Err(e) = self.run_refresh().await {
                        warn!(error = %e, "data refresh failed, retrying next interval");
                    }
                }
                _ = analysis_interval.tick() => {
                    self.run_trading_cycle().await;
                }
                _ = rebalance_interval.tick() => {
                    self.run_rebalance().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown signal received, exiting scheduler loop");
                        break;
                    }
                }
            }
        }
    }

    /// Fetch a market snapshot and the latest sample for every tracked
    /// symbol. Per-symbol timeouts skip that symbol; a provider-level fault
    /// aborts the refresh.
    pub async fn run_refresh(&self) -> Result<(), PipelineError> {
        let timeout = Duration::from_millis(self.config.external_call_timeout_ms);

        let snapshots =
            match tokio::time::timeout(timeout, self.provider.market_snapshot(&self.config.symbols))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(PipelineError::DataUnavailable(
                        "market snapshot timed out".to_string(),
                    ))
                }
            };

        let mut known: HashMap<String, Asset> = self
            .store
            .active_assets()
            .await?
            .into_iter()
            .map(|a| (a.symbol.clone(), a))
            .collect();
        for snapshot in &snapshots {
            let asset = match known.remove(&snapshot.symbol) {
                Some(mut asset) => {
                    asset.apply_snapshot(snapshot);
                    asset
                }
                None => Asset::from_snapshot(snapshot),
            };
            self.store.upsert_asset(asset).await?;
        }

        for symbol in &self.config.symbols {
            match tokio::time::timeout(timeout, self.provider.latest_sample(symbol)).await {
                Ok(Ok(Some(sample))) => {
                    self.store.append_price_sample(sample).await?;
                }
                Ok(Ok(None)) => {
                    debug!(%symbol, "no new sample");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(%symbol, "sample fetch timed out, skipping symbol");
                }
            }
        }
        Ok(())
    }

    /// One full trading cycle: refresh, risk-state update, position
    /// monitoring (exits first), then analyze-size-execute per asset.
    pub async fn run_trading_cycle(&self) -> CycleOutcome {
        let cycle_at = Utc::now();
        let mut outcome = CycleOutcome::default();

        // Analysis always sees data no older than one refresh interval.
        if let Err(e) = self.run_refresh().await {
            warn!(error = %e, "cycle aborted, shared infrastructure unavailable");
            return outcome;
        }

        let assets = match self.store.active_assets().await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(error = %e, "cycle aborted, cannot load assets");
                return outcome;
            }
        };
        let universe = UniverseSnapshot::from_assets(&assets);

        let (prices, volatilities) = self.market_state(&assets).await;

        // Risk-off transitions are evaluated before any sizing.
        let mut risk = self.risk.lock().await;
        if let Some(triggered) = risk.update_market_state(&volatilities) {
            let detail = if triggered {
                "realized volatility breached black-swan threshold".to_string()
            } else {
                "volatility back under threshold".to_string()
            };
            self.notify(Notification::RiskOff {
                triggered,
                detail,
                at: cycle_at,
            })
            .await;
        }
        let force_liquidate =
            risk.is_risk_off() && risk.liquidation_policy() == LiquidationPolicy::ForceLiquidate;

        // Exits take priority over new entries.
        let mut executor = self.executor.lock().await;
        let exits = executor.monitor_positions(&prices, force_liquidate).await;
        outcome.exits = exits.len();
        for exit in exits {
            self.notify(Notification::PositionExited {
                symbol: exit.symbol,
                reason: exit.reason.to_string(),
                pnl: exit.realized_pnl,
                at: cycle_at,
            })
            .await;
        }

        for asset in assets.iter().filter(|a| a.is_tradable()) {
            let history = match self.store.price_history(&asset.symbol, HISTORY_LIMIT).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(symbol = %asset.symbol, error = %e, "history load failed, skipping");
                    outcome.failures += 1;
                    continue;
                }
            };

            let analysis = match self.engine.analyze(asset, &history, &universe, None) {
                Some(analysis) => analysis,
                None => continue,
            };
            outcome.analyzed += 1;

            if let Err(e) = self.store.save_analysis(analysis.clone()).await {
                warn!(symbol = %asset.symbol, error = %e, "analysis not persisted");
            }

            let positions = executor.active_positions();
            let summary = executor.get_trading_summary();
            let metrics = risk.assess_portfolio_risk(
                summary.available_cash,
                summary.realized_pnl,
                &positions,
                &prices,
                &volatilities,
            );

            let approved = match risk.size_position(asset, &analysis, &metrics, &positions) {
                Ok(approved) => approved,
                Err(rejection) => {
                    info!(symbol = %asset.symbol, %rejection, "sizing rejected");
                    outcome.rejected += 1;
                    self.notify(Notification::SizingRejected {
                        symbol: asset.symbol.clone(),
                        reason: rejection.to_string(),
                        cycle_at,
                    })
                    .await;
                    continue;
                }
            };

            if let Err(failure) = executor.execute(&approved).await {
                error!(symbol = %asset.symbol, error = %failure, "execution failed");
                outcome.failures += 1;
                if approved.intent == OrderIntent::Entry {
                    risk.release_deployment(
                        approved.quantity.value() * approved.reference_price.value(),
                    );
                }
                self.notify(Notification::ExecutionFailed {
                    symbol: asset.symbol.clone(),
                    reason: failure.to_string(),
                    cycle_at,
                })
                .await;
                continue;
            }
            outcome.executed += 1;
        }
        drop(executor);
        drop(risk);

        info!(
            analyzed = outcome.analyzed,
            executed = outcome.executed,
            rejected = outcome.rejected,
            failures = outcome.failures,
            exits = outcome.exits,
            "trading cycle complete"
        );
        self.notify(Notification::CycleSummary {
            cycle_at,
            analyzed: outcome.analyzed,
            executed: outcome.executed,
            rejected: outcome.rejected,
            failures: outcome.failures,
        })
        .await;
        outcome
    }

    /// Periodic portfolio risk review: recompute metrics and publish the
    /// risk report.
    pub async fn run_rebalance(&self) {
        let assets = match self.store.active_assets().await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(error = %e, "rebalance skipped, cannot load assets");
                return;
            }
        };
        let (prices, volatilities) = self.market_state(&assets).await;

        let executor = self.executor.lock().await;
        let positions = executor.active_positions();
        let summary = executor.get_trading_summary();
        drop(executor);

        let risk = self.risk.lock().await;
        let metrics = risk.assess_portfolio_risk(
            summary.available_cash,
            summary.realized_pnl,
            &positions,
            &prices,
            &volatilities,
        );
        let report = risk.get_risk_report(&metrics, &positions, &prices, &volatilities);
        drop(risk);

        info!(
            total_value = metrics.total_value,
            var_percent = metrics.portfolio_var_percent,
            "portfolio risk reviewed"
        );
        self.notify(Notification::RiskReport {
            report,
            at: Utc::now(),
        })
        .await;
    }

    /// Latest close and short-window realized volatility per symbol,
    /// derived from stored history.
    async fn market_state(
        &self,
        assets: &[Asset],
    ) -> (HashMap<String, f64>, HashMap<String, f64>) {
        let mut prices = HashMap::new();
        let mut volatilities = HashMap::new();
        for asset in assets {
            let history = match self
                .store
                .price_history(&asset.symbol, VOLATILITY_WINDOW + 1)
                .await
            {
                Ok(history) => history,
                Err(_) => continue,
            };
            let closes = indicators::closes(&history);
            if let Some(&last) = closes.last() {
                prices.insert(asset.symbol.clone(), last);
            }
            if let Some(vol) = indicators::realized_volatility(&closes, VOLATILITY_WINDOW) {
                volatilities.insert(asset.symbol.clone(), vol);
            }
        }
        (prices, volatilities)
    }

    /// Notification delivery is best-effort; a failing notifier never
    /// interrupts the pipeline.
    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(error = %e, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::analysis_engine::AnalysisWeights;
    use crate::domain::services::risk_manager::RiskConfig;
    use crate::infrastructure::exchange::SimulatedExchange;
    use crate::infrastructure::market_data::{InMemoryMarketStore, StaticDataProvider};
    use crate::infrastructure::notifier::LogNotifier;

    fn test_config() -> AutomationConfig {
        AutomationConfig {
            symbols: vec!["BTC-USD".to_string()],
            min_history_len: 5,
            ..AutomationConfig::default()
        }
    }

    fn build_scheduler(
        config: AutomationConfig,
        store: Arc<InMemoryMarketStore>,
        provider: Arc<StaticDataProvider>,
        exchange: Arc<SimulatedExchange>,
    ) -> Arc<AutomationScheduler> {
        let engine = AnalysisEngine::new(
            AnalysisWeights {
                technical: 0.5,
                fundamental: 0.3,
                sentiment: 0.2,
            },
            config.signal_threshold,
            config.strength_ceiling,
            config.min_history_len,
        );
        let risk = RiskManager::new(RiskConfig {
            risk_per_trade_percent: config.risk_per_trade_percent,
            max_portfolio_var_percent: config.max_portfolio_var_percent,
            max_daily_deployment: config.max_daily_deployment,
            max_concurrent_positions: config.max_concurrent_positions,
            default_stop_loss_pct: config.default_stop_loss_pct,
            default_take_profit_pct: config.default_take_profit_pct,
            black_swan_volatility_threshold: config.black_swan_volatility_threshold,
            liquidation_policy: config.liquidation_policy,
        });
        let executor = TradingExecutor::new(
            exchange,
            store.clone(),
            Duration::from_millis(config.external_call_timeout_ms),
            config.initial_capital,
        );
        Arc::new(AutomationScheduler::new(
            config,
            engine,
            risk,
            executor,
            store,
            provider,
            Arc::new(LogNotifier),
        ))
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let scheduler = build_scheduler(
            test_config(),
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(StaticDataProvider::new(vec![])),
            Arc::new(SimulatedExchange::new(0.0)),
        );
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        scheduler.start().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = build_scheduler(
            test_config(),
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(StaticDataProvider::new(vec![])),
            Arc::new(SimulatedExchange::new(0.0)),
        );
        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        scheduler.start().await;
        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_while_running_is_ignored() {
        let scheduler = build_scheduler(
            test_config(),
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(StaticDataProvider::new(vec![])),
            Arc::new(SimulatedExchange::new(0.0)),
        );
        scheduler.start().await;
        scheduler.start().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_cycle_with_empty_history_executes_nothing() {
        let scheduler = build_scheduler(
            test_config(),
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(StaticDataProvider::new(vec![])),
            Arc::new(SimulatedExchange::new(0.0)),
        );
        let outcome = scheduler.run_trading_cycle().await;
        assert_eq!(outcome.analyzed, 0);
        assert_eq!(outcome.executed, 0);
        assert_eq!(outcome.failures, 0);
    }
}
