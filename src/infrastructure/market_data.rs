//! Market data boundary: the provider trait for fetching snapshots and
//! prices, the store trait for persistence, and in-memory implementations
//! used by paper trading and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::entities::analysis::AnalysisResult;
use crate::domain::entities::asset::{Asset, AssetSnapshot};
use crate::domain::entities::position::Position;
use crate::domain::entities::price_sample::PriceSample;
use crate::domain::entities::trade::Trade;
use crate::domain::errors::PipelineError;

/// Upstream market data source. Implementations wrap an exchange or data
/// vendor API; `StaticDataProvider` serves canned data for paper trading.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn latest_sample(&self, symbol: &str) -> Result<Option<PriceSample>, PipelineError>;

    async fn market_snapshot(
        &self,
        symbols: &[String],
    ) -> Result<Vec<AssetSnapshot>, PipelineError>;
}

/// Persistence boundary for assets, price history, analyses, positions and
/// the trade ledger.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    async fn upsert_asset(&self, asset: Asset) -> Result<(), PipelineError>;

    async fn active_assets(&self) -> Result<Vec<Asset>, PipelineError>;

    /// Append a sample unless one with the same timestamp already exists
    /// for the symbol, making refresh replays idempotent.
    async fn append_price_sample(&self, sample: PriceSample) -> Result<(), PipelineError>;

    /// Most recent `limit` samples in chronological order.
    async fn price_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PriceSample>, PipelineError>;

    /// Keyed by (symbol, timestamp); replaying the same analysis overwrites
    /// the identical record.
    async fn save_analysis(&self, analysis: AnalysisResult) -> Result<(), PipelineError>;

    async fn save_position(&self, position: Position) -> Result<(), PipelineError>;

    async fn positions(&self) -> Result<Vec<Position>, PipelineError>;

    async fn append_trade(&self, trade: Trade) -> Result<(), PipelineError>;

    async fn trades(&self) -> Result<Vec<Trade>, PipelineError>;
}

#[derive(Default)]
struct StoreInner {
    assets: HashMap<String, Asset>,
    samples: HashMap<String, Vec<PriceSample>>,
    analyses: HashMap<(String, DateTime<Utc>), AnalysisResult>,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
}

#[derive(Default)]
pub struct InMemoryMarketStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload history without going through the provider (tests, backfill).
    pub fn seed_history(&self, samples: Vec<PriceSample>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        for sample in samples {
            inner
                .samples
                .entry(sample.symbol.clone())
                .or_default()
                .push(sample);
        }
    }

    pub fn analysis_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.analyses.len()
    }
}

#[async_trait]
impl MarketDataStore for InMemoryMarketStore {
    async fn upsert_asset(&self, asset: Asset) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.assets.insert(asset.symbol.clone(), asset);
        Ok(())
    }

    async fn active_assets(&self) -> Result<Vec<Asset>, PipelineError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut assets: Vec<Asset> = inner
            .assets
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(assets)
    }

    async fn append_price_sample(&self, sample: PriceSample) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let series = inner.samples.entry(sample.symbol.clone()).or_default();
        if series.iter().any(|s| s.timestamp == sample.timestamp) {
            debug!(symbol = %sample.symbol, timestamp = %sample.timestamp, "duplicate sample skipped");
            return Ok(());
        }
        series.push(sample);
        series.sort_by_key(|s| s.timestamp);
        Ok(())
    }

    async fn price_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PriceSample>, PipelineError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let series = match inner.samples.get(symbol) {
            Some(series) => series,
            None => return Ok(vec![]),
        };
        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }

    async fn save_analysis(&self, analysis: AnalysisResult) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .analyses
            .insert((analysis.symbol.clone(), analysis.timestamp), analysis);
        Ok(())
    }

    async fn save_position(&self, position: Position) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.positions.insert(position.id.clone(), position);
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<Position>, PipelineError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut positions: Vec<Position> = inner.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        Ok(positions)
    }

    async fn append_trade(&self, trade: Trade) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.trades.push(trade);
        Ok(())
    }

    async fn trades(&self) -> Result<Vec<Trade>, PipelineError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner.trades.clone())
    }
}

/// Provider that serves preconfigured snapshots and samples. Used for
/// paper trading and scheduler tests; each `latest_sample` call advances
/// through the configured series.
pub struct StaticDataProvider {
    snapshots: Vec<AssetSnapshot>,
    series: RwLock<HashMap<String, Vec<PriceSample>>>,
}

impl StaticDataProvider {
    pub fn new(snapshots: Vec<AssetSnapshot>) -> Self {
        StaticDataProvider {
            snapshots,
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn push_samples(&self, symbol: &str, samples: Vec<PriceSample>) {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series
            .entry(symbol.to_string())
            .or_default()
            .extend(samples);
    }
}

#[async_trait]
impl DataProvider for StaticDataProvider {
    async fn latest_sample(&self, symbol: &str) -> Result<Option<PriceSample>, PipelineError> {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        match series.get_mut(symbol) {
            Some(queue) if !queue.is_empty() => Ok(Some(queue.remove(0))),
            _ => Ok(None),
        }
    }

    async fn market_snapshot(
        &self,
        symbols: &[String],
    ) -> Result<Vec<AssetSnapshot>, PipelineError> {
        Ok(self
            .snapshots
            .iter()
            .filter(|s| symbols.contains(&s.symbol))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::asset::AssetClass;
    use chrono::TimeZone;

    fn sample_at(symbol: &str, hour: u32, close: f64) -> PriceSample {
        PriceSample::new(
            symbol.to_string(),
            Utc.with_ymd_and_hms(2026, 8, 20, hour, 0, 0).unwrap(),
            close,
            close * 1.01,
            close * 0.99,
            close,
            1000.0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_sample_skipped() {
        let store = InMemoryMarketStore::new();
        store
            .append_price_sample(sample_at("ETH-USD", 10, 2500.0))
            .await
            .unwrap();
        store
            .append_price_sample(sample_at("ETH-USD", 10, 2500.0))
            .await
            .unwrap();
        store
            .append_price_sample(sample_at("ETH-USD", 11, 2510.0))
            .await
            .unwrap();
        let history = store.price_history("ETH-USD", 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_history_chronological_and_limited() {
        let store = InMemoryMarketStore::new();
        for hour in [12, 10, 11, 13] {
            store
                .append_price_sample(sample_at("BTC-USD", hour, 50000.0 + hour as f64))
                .await
                .unwrap();
        }
        let history = store.price_history("BTC-USD", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(history[0].timestamp.format("%H").to_string(), "11");
    }

    #[tokio::test]
    async fn test_analysis_replay_overwrites_same_key() {
        let store = InMemoryMarketStore::new();
        let ts = Utc.with_ymd_and_hms(2026, 8, 20, 10, 0, 0).unwrap();
        let analysis = AnalysisResult {
            symbol: "BTC-USD".to_string(),
            timestamp: ts,
            technical_score: 0.5,
            fundamental_score: 0.3,
            sentiment_score: 0.0,
            overall_score: 0.32,
            signal_type: crate::domain::entities::analysis::SignalType::Buy,
            signal_strength: 0.4,
            partial_data: false,
        };
        store.save_analysis(analysis.clone()).await.unwrap();
        store.save_analysis(analysis).await.unwrap();
        assert_eq!(store.analysis_count(), 1);
    }

    #[tokio::test]
    async fn test_active_assets_filters_deactivated() {
        let store = InMemoryMarketStore::new();
        let snapshot = AssetSnapshot {
            symbol: "BTC-USD".to_string(),
            name: "Bitcoin".to_string(),
            classification: AssetClass::Layer1,
            market_cap: 1e12,
            volume_24h: 1e10,
            price: 50000.0,
            change_24h: 1.0,
        };
        let mut delisted = Asset::from_snapshot(&AssetSnapshot {
            symbol: "OLD-USD".to_string(),
            ..snapshot.clone()
        });
        delisted.deactivate();
        store
            .upsert_asset(Asset::from_snapshot(&snapshot))
            .await
            .unwrap();
        store.upsert_asset(delisted).await.unwrap();
        let active = store.active_assets().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol, "BTC-USD");
    }

    #[tokio::test]
    async fn test_static_provider_serves_samples_in_order() {
        let provider = StaticDataProvider::new(vec![]);
        provider.push_samples(
            "BTC-USD",
            vec![sample_at("BTC-USD", 10, 50000.0), sample_at("BTC-USD", 11, 50100.0)],
        );
        let first = provider.latest_sample("BTC-USD").await.unwrap().unwrap();
        let second = provider.latest_sample("BTC-USD").await.unwrap().unwrap();
        assert!(first.timestamp < second.timestamp);
        assert!(provider.latest_sample("BTC-USD").await.unwrap().is_none());
    }
}
