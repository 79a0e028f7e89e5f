//! Trading executor: turns approved orders into exchange fills and owns the
//! resulting positions and trade ledger.
//!
//! Execution failures are per-asset and recoverable. A failed order leaves
//! positions, trades and cash untouched so the scheduler can move on to the
//! next asset and retry on a later cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::entities::position::Position;
use crate::domain::entities::trade::{Trade, TradeSide};
use crate::domain::errors::ExecutionFailure;
use crate::domain::services::risk_manager::{ApprovedOrder, OrderIntent};
use crate::domain::value_objects::price::Price;
use crate::infrastructure::exchange::{ExchangeClient, OrderRequest, OrderType};
use crate::infrastructure::market_data::MarketDataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    ForcedLiquidation,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::Signal => write!(f, "sell signal"),
            ExitReason::ForcedLiquidation => write!(f, "forced liquidation"),
        }
    }
}

/// Exit completed during position monitoring.
#[derive(Debug, Clone)]
pub struct TriggeredExit {
    pub symbol: String,
    pub reason: ExitReason,
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradingSummary {
    pub active_positions: usize,
    pub total_trades: usize,
    pub realized_pnl: f64,
    pub available_cash: f64,
}

pub struct TradingExecutor {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn MarketDataStore>,
    order_timeout: Duration,
    /// Active positions keyed by symbol. At most one per asset.
    active: HashMap<String, Position>,
    trades: Vec<Trade>,
    /// Symbols with an order currently being placed.
    in_flight: HashSet<String>,
    available_cash: f64,
    realized_pnl: f64,
}

impl TradingExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn MarketDataStore>,
        order_timeout: Duration,
        initial_capital: f64,
    ) -> Self {
        TradingExecutor {
            exchange,
            store,
            order_timeout,
            active: HashMap::new(),
            trades: Vec::new(),
            in_flight: HashSet::new(),
            available_cash: initial_capital,
            realized_pnl: 0.0,
        }
    }

    pub fn active_positions(&self) -> Vec<Position> {
        self.active.values().cloned().collect()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn available_cash(&self) -> f64 {
        self.available_cash
    }

    /// Execute an approved order. Entries open a position with stops derived
    /// from the approved percentages; exits close the referenced position.
    pub async fn execute(&mut self, approved: &ApprovedOrder) -> Result<(), ExecutionFailure> {
        if self.in_flight.contains(&approved.symbol) {
            return Err(ExecutionFailure::OutstandingOrder {
                symbol: approved.symbol.clone(),
            });
        }
        self.in_flight.insert(approved.symbol.clone());
        let result = match &approved.intent {
            OrderIntent::Entry => self.execute_entry(approved).await,
            OrderIntent::Exit { position_id } => self
                .execute_exit(&approved.symbol, position_id.clone(), ExitReason::Signal)
                .await
                .map(|_| ()),
        };
        self.in_flight.remove(&approved.symbol);
        result
    }

    async fn execute_entry(&mut self, approved: &ApprovedOrder) -> Result<(), ExecutionFailure> {
        if self.active.contains_key(&approved.symbol) {
            return Err(ExecutionFailure::OrderRejected {
                symbol: approved.symbol.clone(),
                reason: "active position already exists".to_string(),
            });
        }

        let estimated_cost = approved.quantity.value() * approved.reference_price.value();
        if estimated_cost > self.available_cash {
            return Err(ExecutionFailure::InsufficientBalance {
                required: estimated_cost,
                available: self.available_cash,
            });
        }

        let request = OrderRequest {
            client_order_id: new_client_order_id(&approved.symbol),
            symbol: approved.symbol.clone(),
            side: TradeSide::Buy,
            quantity: approved.quantity,
            order_type: OrderType::Market,
            limit_price: None,
        };
        let fill = self.place_with_timeout(&request).await?;

        let position = Position::open(
            format!("pos-{}", fill.order_id),
            approved.symbol.clone(),
            fill.price,
            fill.quantity,
            approved.stop_loss_pct,
            approved.take_profit_pct,
            fill.executed_at,
        )
        .map_err(|e| ExecutionFailure::OrderRejected {
            symbol: approved.symbol.clone(),
            reason: e.to_string(),
        })?;

        let trade = Trade {
            id: fill.order_id.clone(),
            position_id: position.id.clone(),
            symbol: approved.symbol.clone(),
            side: TradeSide::Buy,
            quantity: fill.quantity,
            price: fill.price,
            fee: fill.fee,
            executed_at: fill.executed_at,
        };

        self.store
            .save_position(position.clone())
            .await
            .map_err(|e| ExecutionFailure::Storage(e.to_string()))?;
        self.store
            .append_trade(trade.clone())
            .await
            .map_err(|e| ExecutionFailure::Storage(e.to_string()))?;

        self.available_cash -= trade.notional_value() + trade.fee;
        info!(
            symbol = %approved.symbol,
            quantity = fill.quantity.value(),
            price = fill.price.value(),
            stop_loss = position.stop_loss_price.value(),
            take_profit = position.take_profit_price.value(),
            "position opened"
        );
        self.active.insert(approved.symbol.clone(), position);
        self.trades.push(trade);
        Ok(())
    }

    async fn execute_exit(
        &mut self,
        symbol: &str,
        position_id: String,
        reason: ExitReason,
    ) -> Result<f64, ExecutionFailure> {
        let position = match self.active.get(symbol) {
            Some(p) if p.id == position_id => p.clone(),
            _ => {
                return Err(ExecutionFailure::OrderRejected {
                    symbol: symbol.to_string(),
                    reason: "no matching active position".to_string(),
                })
            }
        };

        let request = OrderRequest {
            client_order_id: new_client_order_id(symbol),
            symbol: symbol.to_string(),
            side: TradeSide::Sell,
            quantity: position.quantity,
            order_type: OrderType::Market,
            limit_price: None,
        };
        let fill = self.place_with_timeout(&request).await?;

        let mut closed = position;
        closed.close(
            fill.price,
            fill.executed_at,
            reason == ExitReason::ForcedLiquidation,
        );
        let pnl = closed.realized_pnl.unwrap_or(0.0);

        let trade = Trade {
            id: fill.order_id.clone(),
            position_id: closed.id.clone(),
            symbol: symbol.to_string(),
            side: TradeSide::Sell,
            quantity: fill.quantity,
            price: fill.price,
            fee: fill.fee,
            executed_at: fill.executed_at,
        };

        self.store
            .save_position(closed.clone())
            .await
            .map_err(|e| ExecutionFailure::Storage(e.to_string()))?;
        self.store
            .append_trade(trade.clone())
            .await
            .map_err(|e| ExecutionFailure::Storage(e.to_string()))?;

        self.available_cash += trade.notional_value() - trade.fee;
        self.realized_pnl += pnl;
        self.active.remove(symbol);
        self.trades.push(trade);
        info!(symbol, %reason, pnl, "position closed");
        Ok(pnl)
    }

    async fn place_with_timeout(
        &self,
        request: &OrderRequest,
    ) -> Result<crate::infrastructure::exchange::OrderFill, ExecutionFailure> {
        match tokio::time::timeout(self.order_timeout, self.exchange.place_order(request)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionFailure::Timeout {
                symbol: request.symbol.clone(),
                timeout_ms: self.order_timeout.as_millis() as u64,
            }),
        }
    }

    /// Check every active position against the latest prices and exit those
    /// whose stop-loss or take-profit triggered. With `force_liquidate` all
    /// active positions are exited regardless of levels.
    ///
    /// A failed exit is logged and the position stays active so the next
    /// cycle retries it.
    pub async fn monitor_positions(
        &mut self,
        prices: &HashMap<String, f64>,
        force_liquidate: bool,
    ) -> Vec<TriggeredExit> {
        let mut due: Vec<(String, String, ExitReason)> = Vec::new();
        for position in self.active.values() {
            let current = match prices.get(&position.symbol).copied().map(Price::new) {
                Some(Ok(price)) => price,
                _ => {
                    warn!(symbol = %position.symbol, "no price for position, skipping check");
                    continue;
                }
            };
            let reason = if force_liquidate {
                Some(ExitReason::ForcedLiquidation)
            } else if position.should_stop_loss(current) {
                Some(ExitReason::StopLoss)
            } else if position.should_take_profit(current) {
                Some(ExitReason::TakeProfit)
            } else {
                None
            };
            if let Some(reason) = reason {
                due.push((position.symbol.clone(), position.id.clone(), reason));
            }
        }

        let mut exits = Vec::new();
        for (symbol, position_id, reason) in due {
            match self.execute_exit(&symbol, position_id, reason).await {
                Ok(pnl) => exits.push(TriggeredExit {
                    symbol,
                    reason,
                    realized_pnl: pnl,
                }),
                Err(e) => {
                    error!(%symbol, error = %e, "exit order failed, will retry next cycle");
                }
            }
        }
        exits
    }

    pub fn get_trading_summary(&self) -> TradingSummary {
        TradingSummary {
            active_positions: self.active.len(),
            total_trades: self.trades.len(),
            realized_pnl: self.realized_pnl,
            available_cash: self.available_cash,
        }
    }
}

fn new_client_order_id(symbol: &str) -> String {
    let nonce: u64 = rand::thread_rng().gen();
    format!("ord-{}-{:016x}", symbol.to_lowercase(), nonce)
}
