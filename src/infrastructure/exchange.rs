//! Exchange boundary: the trait the executor talks through, plus a
//! simulated implementation for paper trading and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::ExecutionFailure;
use crate::domain::value_objects::{price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

/// Order submission. `client_order_id` is the idempotency key: resubmitting
/// the same id must not create a second fill.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Quantity,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
}

#[derive(Debug, Clone)]
pub struct OrderFill {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub quantity: Quantity,
    pub price: Price,
    pub fee: f64,
    pub executed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderFill, ExecutionFailure>;

    async fn cancel_order(&self, client_order_id: &str) -> Result<(), ExecutionFailure>;

    /// Net quantity held at the venue, if any.
    async fn get_position(&self, symbol: &str) -> Result<Option<Quantity>, ExecutionFailure>;
}

struct SimulatedState {
    prices: HashMap<String, f64>,
    fills: HashMap<String, OrderFill>,
    holdings: HashMap<String, f64>,
    next_failure: Option<ExecutionFailure>,
    order_seq: u64,
}

/// In-process exchange used for paper trading and tests. Fills market
/// orders at the configured price; caches fills by client order id so a
/// replayed submission returns the original fill instead of duplicating it.
pub struct SimulatedExchange {
    fee_rate: f64,
    state: Mutex<SimulatedState>,
}

impl SimulatedExchange {
    pub fn new(fee_rate: f64) -> Self {
        SimulatedExchange {
            fee_rate,
            state: Mutex::new(SimulatedState {
                prices: HashMap::new(),
                fills: HashMap::new(),
                holdings: HashMap::new(),
                next_failure: None,
                order_seq: 0,
            }),
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.prices.insert(symbol.to_string(), price);
    }

    /// Arm a one-shot failure returned by the next `place_order` call.
    pub fn inject_failure(&self, failure: ExecutionFailure) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_failure = Some(failure);
    }

    pub fn fill_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fills.len()
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderFill, ExecutionFailure> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(failure) = state.next_failure.take() {
            return Err(failure);
        }

        // Idempotent replay: same client order id returns the cached fill.
        if let Some(fill) = state.fills.get(&request.client_order_id) {
            debug!(
                client_order_id = %request.client_order_id,
                "duplicate submission, returning cached fill"
            );
            return Ok(fill.clone());
        }

        let price = match request.order_type {
            OrderType::Limit => request.limit_price,
            OrderType::Market => state
                .prices
                .get(&request.symbol)
                .copied()
                .map(Price::new)
                .transpose()
                .map_err(|e| ExecutionFailure::OrderRejected {
                    symbol: request.symbol.clone(),
                    reason: e.to_string(),
                })?,
        }
        .ok_or_else(|| ExecutionFailure::OrderRejected {
            symbol: request.symbol.clone(),
            reason: "no price available".to_string(),
        })?;

        state.order_seq += 1;
        let fill = OrderFill {
            order_id: format!("sim-{}", state.order_seq),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            quantity: request.quantity,
            price,
            fee: request.quantity.value() * price.value() * self.fee_rate,
            executed_at: Utc::now(),
        };

        let holding = state.holdings.entry(request.symbol.clone()).or_insert(0.0);
        match request.side {
            TradeSide::Buy => *holding += request.quantity.value(),
            TradeSide::Sell => *holding -= request.quantity.value(),
        }

        state
            .fills
            .insert(request.client_order_id.clone(), fill.clone());
        Ok(fill)
    }

    async fn cancel_order(&self, _client_order_id: &str) -> Result<(), ExecutionFailure> {
        // Market orders fill synchronously in the simulator.
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Quantity>, ExecutionFailure> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.holdings.get(symbol) {
            Some(&qty) if qty > 0.0 => Quantity::new(qty)
                .map(Some)
                .map_err(|e| ExecutionFailure::Network(e.to_string())),
            _ => Ok(None),
        }
    }
}
