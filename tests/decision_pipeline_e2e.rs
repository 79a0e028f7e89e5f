//! End-to-end tests: a scheduler wired with the in-memory store, static
//! provider and simulated exchange runs full trading cycles against seeded
//! market data.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};

use astraeus::application::scheduler::{AutomationScheduler, SchedulerState};
use astraeus::config::AutomationConfig;
use astraeus::domain::entities::asset::{AssetClass, AssetSnapshot};
use astraeus::domain::entities::price_sample::PriceSample;
use astraeus::domain::services::analysis_engine::AnalysisEngine;
use astraeus::domain::services::risk_manager::{RiskConfig, RiskManager};
use astraeus::domain::services::trading_executor::TradingExecutor;
use astraeus::infrastructure::exchange::SimulatedExchange;
use astraeus::infrastructure::market_data::{
    InMemoryMarketStore, MarketDataStore, StaticDataProvider,
};
use astraeus::infrastructure::notifier::LogNotifier;

fn test_config(symbols: &[&str]) -> AutomationConfig {
    AutomationConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        min_history_len: 30,
        max_daily_deployment: 200_000.0,
        ..AutomationConfig::default()
    }
}

/// Steadily rising hourly closes, enough history for a full analysis.
fn rising_history(symbol: &str, start_price: f64, bars: usize) -> Vec<PriceSample> {
    let start = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
    let mut price = start_price;
    (0..bars)
        .map(|i| {
            price *= 1.01;
            PriceSample::new(
                symbol.to_string(),
                start + ChronoDuration::hours(i as i64),
                price,
                price * 1.005,
                price * 0.995,
                price,
                1e7,
            )
            .unwrap()
        })
        .collect()
}

fn snapshot(symbol: &str, price: f64) -> AssetSnapshot {
    AssetSnapshot {
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        classification: AssetClass::Layer1,
        market_cap: 1e11,
        volume_24h: 1e9,
        price,
        change_24h: 5.0,
    }
}

fn build_scheduler(
    config: AutomationConfig,
    store: Arc<InMemoryMarketStore>,
    provider: Arc<StaticDataProvider>,
    exchange: Arc<SimulatedExchange>,
) -> Arc<AutomationScheduler> {
    let engine = AnalysisEngine::new(
        config.weights,
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
async fn test_full_cycle_opens_position_on_uptrend() {
    let store = Arc::new(InMemoryMarketStore::new());
    let history = rising_history("BTC-USD", 40000.0, 60);
    let last_price = history.last().unwrap().close.value();
    store.seed_history(history);

    let provider = Arc::new(StaticDataProvider::new(vec![snapshot(
        "BTC-USD", last_price,
    )]));
    let exchange = Arc::new(SimulatedExchange::new(0.001));
    exchange.set_price("BTC-USD", last_price);

    let scheduler = build_scheduler(test_config(&["BTC-USD"]), store.clone(), provider, exchange);

    let outcome = scheduler.run_trading_cycle().await;
    assert_eq!(outcome.analyzed, 1);
    assert_eq!(outcome.executed, 1);
    assert_eq!(outcome.failures, 0);

    let positions = store.positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert!(positions[0].is_active());
    assert_eq!(positions[0].symbol, "BTC-USD");

    let trades = store.trades().await.unwrap();
    assert_eq!(trades.len(), 1);
}

#[tokio::test]
async fn test_second_cycle_rejects_duplicate_entry() {
    let store = Arc::new(InMemoryMarketStore::new());
    let history = rising_history("ETH-USD", 2000.0, 60);
    let last_price = history.last().unwrap().close.value();
    store.seed_history(history);

    let provider = Arc::new(StaticDataProvider::new(vec![snapshot(
        "ETH-USD", last_price,
    )]));
    let exchange = Arc::new(SimulatedExchange::new(0.0));
    exchange.set_price("ETH-USD", last_price);

    let scheduler = build_scheduler(test_config(&["ETH-USD"]), store.clone(), provider, exchange);

    let first = scheduler.run_trading_cycle().await;
    assert_eq!(first.executed, 1);

    let second = scheduler.run_trading_cycle().await;
    assert_eq!(second.executed, 0);
    assert_eq!(second.rejected, 1);

    let active = store
        .positions()
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.is_active())
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_cycle_isolates_asset_without_history() {
    let store = Arc::new(InMemoryMarketStore::new());
    // Only BTC has history; the unknown symbol analyzes to None and is
    // skipped without failing the cycle.
    let history = rising_history("BTC-USD", 40000.0, 60);
    let last_price = history.last().unwrap().close.value();
    store.seed_history(history);

    let provider = Arc::new(StaticDataProvider::new(vec![
        snapshot("BTC-USD", last_price),
        snapshot("NEW-USD", 10.0),
    ]));
    let exchange = Arc::new(SimulatedExchange::new(0.0));
    exchange.set_price("BTC-USD", last_price);

    let scheduler = build_scheduler(
        test_config(&["BTC-USD", "NEW-USD"]),
        store.clone(),
        provider,
        exchange,
    );

    let outcome = scheduler.run_trading_cycle().await;
    assert_eq!(outcome.analyzed, 1);
    assert_eq!(outcome.executed, 1);
    assert_eq!(outcome.failures, 0);
}

#[tokio::test]
async fn test_refresh_is_idempotent_on_replayed_samples() {
    let store = Arc::new(InMemoryMarketStore::new());
    let provider = Arc::new(StaticDataProvider::new(vec![snapshot("BTC-USD", 50000.0)]));
    let sample = PriceSample::new(
        "BTC-USD".to_string(),
        Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap(),
        50000.0,
        50100.0,
        49900.0,
        50000.0,
        1e7,
    )
    .unwrap();
    // The same sample offered twice, e.g. a provider replay.
    provider.push_samples("BTC-USD", vec![sample.clone(), sample]);

    let exchange = Arc::new(SimulatedExchange::new(0.0));
    let scheduler = build_scheduler(test_config(&["BTC-USD"]), store.clone(), provider, exchange);

    scheduler.run_refresh().await.unwrap();
    scheduler.run_refresh().await.unwrap();

    let history = store.price_history("BTC-USD", 10).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_scheduler_lifecycle_under_load() {
    let store = Arc::new(InMemoryMarketStore::new());
    let history = rising_history("BTC-USD", 40000.0, 60);
    let last_price = history.last().unwrap().close.value();
    store.seed_history(history);

    let provider = Arc::new(StaticDataProvider::new(vec![snapshot(
        "BTC-USD", last_price,
    )]));
    let exchange = Arc::new(SimulatedExchange::new(0.0));
    exchange.set_price("BTC-USD", last_price);

    let scheduler = build_scheduler(test_config(&["BTC-USD"]), store, provider, exchange);

    scheduler.start().await;
    assert_eq!(scheduler.state(), SchedulerState::Running);

    // Let the immediately-due interval ticks run.
    tokio::time::sleep(Duration::from_millis(50)).await;

    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    // Stopping again stays a no-op.
    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}
