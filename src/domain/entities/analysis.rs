use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Buy => write!(f, "BUY"),
            SignalType::Sell => write!(f, "SELL"),
            SignalType::Hold => write!(f, "HOLD"),
        }
    }
}

/// Result of one analysis pass over one asset. Immutable once written;
/// one result per (asset, cycle). All sub-scores live in [-1, 1] and the
/// strength in [0, 1].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub symbol: String,
    /// Timestamp of the latest price sample the analysis saw. Replaying
    /// the same history yields the same timestamp and the same result.
    pub timestamp: DateTime<Utc>,
    pub technical_score: f64,
    pub fundamental_score: f64,
    pub sentiment_score: f64,
    pub overall_score: f64,
    pub signal_type: SignalType,
    pub signal_strength: f64,
    /// Set when the technical score was neutralized for lack of history.
    pub partial_data: bool,
}
