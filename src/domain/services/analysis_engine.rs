//! Multi-factor analysis engine.
//!
//! Fuses technical, fundamental, and sentiment sub-scores (each in [-1, 1])
//! into a weighted overall score and a directional signal. Stateless: every
//! call derives its result entirely from the inputs, so replaying the same
//! history produces an identical result.

use tracing::debug;

use crate::domain::entities::analysis::{AnalysisResult, SignalType};
use crate::domain::entities::asset::Asset;
use crate::domain::entities::price_sample::PriceSample;
use crate::domain::errors::ConfigError;
use crate::domain::services::indicators::{self, Ema, Rsi};

const EMA_FAST_PERIOD: usize = 12;
const EMA_SLOW_PERIOD: usize = 26;
const RSI_PERIOD: usize = 14;
const MOMENTUM_LOOKBACK: usize = 10;

/// Weight triple for the three sub-scores. Must sum to 1.0; misconfiguration
/// is fatal at startup, never silently normalized.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisWeights {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
}

impl AnalysisWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("technical", self.technical),
            ("fundamental", self.fundamental),
            ("sentiment", self.sentiment),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(ConfigError::WeightOutOfRange { name, value });
            }
        }
        let sum = self.technical + self.fundamental + self.sentiment;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsNotNormalized { sum });
        }
        Ok(())
    }
}

/// Cross-sectional view of the tracked universe, rebuilt each cycle from
/// the active assets. Feeds the fundamental sub-score with percentile ranks.
#[derive(Debug, Clone, Default)]
pub struct UniverseSnapshot {
    market_caps: Vec<f64>,
    volumes: Vec<f64>,
}

impl UniverseSnapshot {
    pub fn from_assets(assets: &[Asset]) -> Self {
        let mut market_caps: Vec<f64> = assets.iter().map(|a| a.market_cap).collect();
        let mut volumes: Vec<f64> = assets.iter().map(|a| a.volume_24h).collect();
        market_caps.sort_by(|a, b| a.total_cmp(b));
        volumes.sort_by(|a, b| a.total_cmp(b));
        UniverseSnapshot {
            market_caps,
            volumes,
        }
    }

    /// Fraction of the universe at or below `value`, in [0, 1].
    fn percentile(sorted: &[f64], value: f64) -> f64 {
        if sorted.is_empty() {
            return 0.5;
        }
        let below = sorted.iter().filter(|&&v| v <= value).count();
        below as f64 / sorted.len() as f64
    }

    pub fn market_cap_rank(&self, market_cap: f64) -> f64 {
        Self::percentile(&self.market_caps, market_cap)
    }

    pub fn volume_rank(&self, volume: f64) -> f64 {
        Self::percentile(&self.volumes, volume)
    }
}

pub struct AnalysisEngine {
    weights: AnalysisWeights,
    signal_threshold: f64,
    strength_ceiling: f64,
    min_history_len: usize,
}

impl AnalysisEngine {
    /// Weights must already be validated (see [`AnalysisWeights::validate`]).
    pub fn new(
        weights: AnalysisWeights,
        signal_threshold: f64,
        strength_ceiling: f64,
        min_history_len: usize,
    ) -> Self {
        AnalysisEngine {
            weights,
            signal_threshold,
            strength_ceiling,
            min_history_len,
        }
    }

    /// Analyze one asset. Returns `None` when price history is entirely
    /// absent — a normal "not yet analyzable" outcome, not a fault.
    /// No side effects; persisting the result is the caller's job.
    pub fn analyze(
        &self,
        asset: &Asset,
        history: &[PriceSample],
        universe: &UniverseSnapshot,
        sentiment: Option<f64>,
    ) -> Option<AnalysisResult> {
        if history.is_empty() {
            debug!(symbol = %asset.symbol, "no price history, asset not yet analyzable");
            return None;
        }

        let closes = indicators::closes(history);
        let (technical_score, partial_data) = self.technical_score(&closes);
        let fundamental_score = self.fundamental_score(asset, universe);
        let sentiment_score = sentiment.unwrap_or(0.0).clamp(-1.0, 1.0);

        let (overall_score, signal_type, signal_strength) =
            self.combine(technical_score, fundamental_score, sentiment_score);

        debug!(
            symbol = %asset.symbol,
            technical = technical_score,
            fundamental = fundamental_score,
            sentiment = sentiment_score,
            overall = overall_score,
            signal = %signal_type,
            strength = signal_strength,
            partial_data,
            "analysis complete"
        );

        Some(AnalysisResult {
            symbol: asset.symbol.clone(),
            timestamp: history.last()?.timestamp,
            technical_score,
            fundamental_score,
            sentiment_score,
            overall_score,
            signal_type,
            signal_strength,
            partial_data,
        })
    }

    /// Weighted combination and classification. Split out so the numeric
    /// contract is testable without fabricating price history.
    pub fn combine(
        &self,
        technical: f64,
        fundamental: f64,
        sentiment: f64,
    ) -> (f64, SignalType, f64) {
        let overall = self.weights.technical * technical
            + self.weights.fundamental * fundamental
            + self.weights.sentiment * sentiment;

        let signal_type = if overall >= self.signal_threshold {
            SignalType::Buy
        } else if overall <= -self.signal_threshold {
            SignalType::Sell
        } else {
            SignalType::Hold
        };

        let strength = (overall.abs() / self.strength_ceiling).min(1.0);
        (overall, signal_type, strength)
    }

    /// Technical sub-score in [-1, 1] from trend, RSI displacement, and
    /// short-window momentum. Below the minimum history length the score is
    /// neutral (0) and the partial-data flag is set.
    fn technical_score(&self, closes: &[f64]) -> (f64, bool) {
        if closes.len() < self.min_history_len {
            return (0.0, true);
        }

        let fast = Ema::new(EMA_FAST_PERIOD).calculate(closes);
        let slow = Ema::new(EMA_SLOW_PERIOD).calculate(closes);
        let trend = match (fast.last(), slow.last()) {
            (Some(&f), Some(&s)) if s > f64::EPSILON => {
                // ±5% EMA spread saturates the trend component.
                ((f - s) / s / 0.05).clamp(-1.0, 1.0)
            }
            _ => 0.0,
        };

        let rsi = Rsi::new(RSI_PERIOD).calculate(closes);
        // Oversold (RSI below 50) reads as buy pressure.
        let rsi_component = rsi
            .last()
            .map(|&r| ((50.0 - r) / 50.0).clamp(-1.0, 1.0))
            .unwrap_or(0.0);

        // ±10% move over the lookback saturates momentum.
        let momentum_component = indicators::momentum(closes, MOMENTUM_LOOKBACK)
            .map(|m| (m / 0.10).clamp(-1.0, 1.0))
            .unwrap_or(0.0);

        let score = (trend + rsi_component + momentum_component) / 3.0;
        (score.clamp(-1.0, 1.0), false)
    }

    /// Fundamental sub-score in [-1, 1] from universe percentile ranks of
    /// market cap and 24h volume, tilted by the 24h price change.
    fn fundamental_score(&self, asset: &Asset, universe: &UniverseSnapshot) -> f64 {
        let cap_rank = universe.market_cap_rank(asset.market_cap);
        let volume_rank = universe.volume_rank(asset.volume_24h);
        let rank_component = (cap_rank + volume_rank) - 1.0; // [0,1]x2 -> [-1,1]

        // ±10% daily change saturates the change component.
        let change_component = (asset.change_24h / 10.0).clamp(-1.0, 1.0);

        (0.7 * rank_component + 0.3 * change_component).clamp(-1.0, 1.0)
    }
}
