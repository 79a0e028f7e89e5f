use crate::domain::errors::ValidationError;
use crate::domain::value_objects::price::Price;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One OHLC sample for an asset. Append-only, ordered by timestamp per
/// asset; the latest sample per asset is the analysis input.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSample {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
}

impl PriceSample {
    pub fn new(
        symbol: String,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        Ok(PriceSample {
            symbol,
            timestamp,
            open: Price::new(open)?,
            high: Price::new(high)?,
            low: Price::new(low)?,
            close: Price::new(close)?,
            volume,
        })
    }
}
