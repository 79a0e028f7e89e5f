use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionStatus {
    Active,
    Closed,
    Liquidated,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Active => write!(f, "ACTIVE"),
            PositionStatus::Closed => write!(f, "CLOSED"),
            PositionStatus::Liquidated => write!(f, "LIQUIDATED"),
        }
    }
}

/// A long spot position. Created by the trading executor on a filled entry
/// order; exactly one ACTIVE position may exist per asset at a time.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub entry_price: Price,
    pub quantity: Quantity,
    pub stop_loss_price: Price,
    pub take_profit_price: Price,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub realized_pnl: Option<f64>,
}

impl Position {
    /// Open a position with stop-loss and take-profit prices derived from
    /// the configured percentages relative to the entry price.
    pub fn open(
        id: String,
        symbol: String,
        entry_price: Price,
        quantity: Quantity,
        stop_loss_pct: f64,
        take_profit_pct: f64,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let stop_loss_price = entry_price.multiply(1.0 - stop_loss_pct)?;
        let take_profit_price = entry_price.multiply(1.0 + take_profit_pct)?;
        Ok(Position {
            id,
            symbol,
            entry_price,
            quantity,
            stop_loss_price,
            take_profit_price,
            status: PositionStatus::Active,
            opened_at,
            closed_at: None,
            realized_pnl: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn should_stop_loss(&self, current: Price) -> bool {
        current.value() <= self.stop_loss_price.value()
    }

    pub fn should_take_profit(&self, current: Price) -> bool {
        current.value() >= self.take_profit_price.value()
    }

    pub fn notional_value(&self) -> f64 {
        self.quantity.value() * self.entry_price.value()
    }

    pub fn unrealized_pnl(&self, current: Price) -> f64 {
        (current.value() - self.entry_price.value()) * self.quantity.value()
    }

    /// Mark the position exited at the given fill price. `liquidated`
    /// distinguishes a risk-off forced exit from an ordinary close.
    pub fn close(&mut self, exit_price: Price, closed_at: DateTime<Utc>, liquidated: bool) {
        self.realized_pnl = Some(self.unrealized_pnl(exit_price));
        self.closed_at = Some(closed_at);
        self.status = if liquidated {
            PositionStatus::Liquidated
        } else {
            PositionStatus::Closed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_position() -> Position {
        Position::open(
            "pos_1".to_string(),
            "BTC-USD".to_string(),
            Price::new(50000.0).unwrap(),
            Quantity::new(0.1).unwrap(),
            0.02,
            0.05,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_stops_derived_from_entry() {
        let position = open_position();
        assert!((position.stop_loss_price.value() - 49000.0).abs() < 1e-6);
        assert!((position.take_profit_price.value() - 52500.0).abs() < 1e-6);
        assert!(position.is_active());
    }

    #[test]
    fn test_stop_loss_trigger() {
        let position = open_position();
        assert!(!position.should_stop_loss(Price::new(49500.0).unwrap()));
        assert!(position.should_stop_loss(Price::new(49000.0).unwrap()));
        assert!(position.should_stop_loss(Price::new(48000.0).unwrap()));
    }

    #[test]
    fn test_take_profit_trigger() {
        let position = open_position();
        assert!(!position.should_take_profit(Price::new(52000.0).unwrap()));
        assert!(position.should_take_profit(Price::new(52500.0).unwrap()));
    }

    #[test]
    fn test_close_records_pnl() {
        let mut position = open_position();
        position.close(Price::new(52500.0).unwrap(), Utc::now(), false);
        assert_eq!(position.status, PositionStatus::Closed);
        assert!((position.realized_pnl.unwrap() - 250.0).abs() < 1e-6);
        assert!(position.closed_at.is_some());
        assert!(!position.is_active());
    }

    #[test]
    fn test_liquidated_close() {
        let mut position = open_position();
        position.close(Price::new(48000.0).unwrap(), Utc::now(), true);
        assert_eq!(position.status, PositionStatus::Liquidated);
        assert!(position.realized_pnl.unwrap() < 0.0);
    }
}
