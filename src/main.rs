use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use astraeus::application::scheduler::AutomationScheduler;
use astraeus::config::AutomationConfig;
use astraeus::domain::entities::asset::{AssetClass, AssetSnapshot};
use astraeus::domain::entities::price_sample::PriceSample;
use astraeus::domain::services::analysis_engine::AnalysisEngine;
use astraeus::domain::services::risk_manager::{RiskConfig, RiskManager};
use astraeus::domain::services::trading_executor::TradingExecutor;
use astraeus::infrastructure::exchange::SimulatedExchange;
use astraeus::infrastructure::market_data::{InMemoryMarketStore, StaticDataProvider};
use astraeus::infrastructure::notifier::LogNotifier;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AutomationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration, aborting");
            std::process::exit(1);
        }
    };
    info!(symbols = ?config.symbols, "configuration loaded");

    let store = Arc::new(InMemoryMarketStore::new());
    let exchange = Arc::new(SimulatedExchange::new(0.001));
    let provider = seed_paper_market(&config, &store, &exchange);

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

    let scheduler = Arc::new(AutomationScheduler::new(
        config,
        engine,
        risk,
        executor,
        store,
        provider,
        Arc::new(LogNotifier),
    ));

    scheduler.start().await;
    shutdown_signal().await;
    info!("shutdown signal received");
    scheduler.stop().await;
}

/// Seed the in-memory store and the simulated exchange with a synthetic
/// random-walk market so the paper-trading loop has data from the first
/// cycle. The provider keeps serving fresh samples on each refresh.
fn seed_paper_market(
    config: &AutomationConfig,
    store: &Arc<InMemoryMarketStore>,
    exchange: &Arc<SimulatedExchange>,
) -> Arc<StaticDataProvider> {
    let mut rng = rand::thread_rng();
    let mut snapshots = Vec::new();
    let mut provider_series = Vec::new();

    for symbol in &config.symbols {
        let base: f64 = rng.gen_range(10.0..60000.0);
        let start = Utc::now() - ChronoDuration::hours(72);

        let mut price = base;
        let mut history = Vec::new();
        for hour in 0..72 {
            let drift: f64 = rng.gen_range(-0.01..0.011);
            price *= 1.0 + drift;
            if let Ok(sample) = PriceSample::new(
                symbol.clone(),
                start + ChronoDuration::hours(hour),
                price,
                price * 1.005,
                price * 0.995,
                price,
                rng.gen_range(1e6..1e8),
            ) {
                history.push(sample);
            }
        }

        exchange.set_price(symbol, price);
        snapshots.push(AssetSnapshot {
            symbol: symbol.clone(),
            name: symbol.clone(),
            classification: AssetClass::Other,
            market_cap: price * rng.gen_range(1e6..1e8),
            volume_24h: rng.gen_range(1e7..1e10),
            price,
            change_24h: rng.gen_range(-5.0..5.0),
        });

        // Future samples served one per refresh.
        let mut future = Vec::new();
        let mut future_price = price;
        for minute in 1..=500 {
            let drift: f64 = rng.gen_range(-0.008..0.009);
            future_price *= 1.0 + drift;
            if let Ok(sample) = PriceSample::new(
                symbol.clone(),
                Utc::now() + ChronoDuration::minutes(minute),
                future_price,
                future_price * 1.005,
                future_price * 0.995,
                future_price,
                rng.gen_range(1e6..1e8),
            ) {
                future.push(sample);
            }
        }
        provider_series.push((symbol.clone(), future));
        store.seed_history(history);
    }

    let provider = Arc::new(StaticDataProvider::new(snapshots));
    for (symbol, samples) in provider_series {
        provider.push_samples(&symbol, samples);
    }
    provider
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
