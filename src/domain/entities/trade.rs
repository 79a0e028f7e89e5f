use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Immutable execution record. Append-only ledger; source of truth for
/// realized P&L computation.
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub id: String,
    pub position_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Quantity,
    pub price: Price,
    pub fee: f64,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn notional_value(&self) -> f64 {
        self.quantity.value() * self.price.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_notional_value() {
        let trade = Trade {
            id: "t1".to_string(),
            position_id: "pos_1".to_string(),
            symbol: "BTC-USD".to_string(),
            side: TradeSide::Buy,
            quantity: Quantity::new(0.1).unwrap(),
            price: Price::new(50000.0).unwrap(),
            fee: 5.0,
            executed_at: Utc::now(),
        };
        assert_eq!(trade.notional_value(), 5000.0);
        assert_eq!(trade.side.to_string(), "BUY");
    }
}
