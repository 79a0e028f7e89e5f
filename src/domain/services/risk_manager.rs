//! Risk manager: converts analysis signals into bounded position sizes and
//! monitors portfolio-level exposure.
//!
//! Sizing is fixed-fractional: the currency loss at the configured stop-loss
//! distance equals `risk_per_trade_percent` of portfolio value regardless of
//! asset volatility. Portfolio-level gates (position count, daily deployment,
//! VaR ceiling) are check-and-reserve: an approval reserves its deployment
//! immediately, so the caller must serialize sizing within a cycle.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::domain::entities::analysis::{AnalysisResult, SignalType};
use crate::domain::entities::asset::Asset;
use crate::domain::entities::position::Position;
use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::SizingRejection;
use crate::domain::value_objects::{price::Price, quantity::Quantity};

/// One-day 95% z-score for the parametric VaR estimate.
const VAR_Z_SCORE: f64 = 1.65;

/// What the executor is allowed to do with existing positions while the
/// risk-off flag is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationPolicy {
    /// Block new entries only; existing positions run to their stops.
    BlockEntriesOnly,
    /// Additionally force-exit all active positions.
    ForceLiquidate,
}

/// Derived portfolio metrics, recomputed each cycle from positions and
/// trades. Never cached as authoritative state.
#[derive(Debug, Clone)]
pub struct PortfolioMetrics {
    pub total_value: f64,
    pub total_pnl: f64,
    /// Parametric one-day VaR in currency terms.
    pub portfolio_var: f64,
    pub portfolio_var_percent: f64,
    pub open_positions: usize,
    pub deployed_today: f64,
}

/// Sizing approved by the risk manager, ready for execution.
#[derive(Debug, Clone)]
pub struct ApprovedOrder {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Quantity,
    pub reference_price: Price,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub intent: OrderIntent,
    /// Currency at risk if the stop is hit (entries only).
    pub risk_budget: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderIntent {
    Entry,
    Exit { position_id: String },
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub risk_per_trade_percent: f64,
    pub max_portfolio_var_percent: f64,
    pub max_daily_deployment: f64,
    pub max_concurrent_positions: usize,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
    pub black_swan_volatility_threshold: f64,
    pub liquidation_policy: LiquidationPolicy,
}

pub struct RiskManager {
    config: RiskConfig,
    risk_off: bool,
    deployment_day: NaiveDate,
    deployed_today: f64,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        RiskManager {
            config,
            risk_off: false,
            deployment_day: Utc::now().date_naive(),
            deployed_today: 0.0,
        }
    }

    /// Convert an analysis signal into a bounded position size, or reject.
    ///
    /// Takes `&mut self` deliberately: an approval reserves its projected
    /// deployment in the daily ledger before returning, so two assets in the
    /// same cycle can never both pass a stale capacity check.
    pub fn size_position(
        &mut self,
        asset: &Asset,
        analysis: &AnalysisResult,
        portfolio: &PortfolioMetrics,
        positions: &[Position],
    ) -> Result<ApprovedOrder, SizingRejection> {
        self.roll_deployment_day();

        let active = positions
            .iter()
            .find(|p| p.symbol == asset.symbol && p.is_active());

        match analysis.signal_type {
            SignalType::Hold => Err(SizingRejection::HoldSignal),
            SignalType::Sell => match active {
                // Exits are protective: they bypass the entry gates.
                Some(position) => Ok(ApprovedOrder {
                    symbol: asset.symbol.clone(),
                    side: TradeSide::Sell,
                    quantity: position.quantity,
                    reference_price: position.entry_price,
                    stop_loss_pct: self.config.default_stop_loss_pct,
                    take_profit_pct: self.config.default_take_profit_pct,
                    intent: OrderIntent::Exit {
                        position_id: position.id.clone(),
                    },
                    risk_budget: 0.0,
                }),
                None => Err(SizingRejection::NoPositionToExit {
                    symbol: asset.symbol.clone(),
                }),
            },
            SignalType::Buy => self.size_entry(asset, portfolio, positions, active.is_some()),
        }
    }

    fn size_entry(
        &mut self,
        asset: &Asset,
        portfolio: &PortfolioMetrics,
        positions: &[Position],
        position_exists: bool,
    ) -> Result<ApprovedOrder, SizingRejection> {
        if self.risk_off {
            return Err(SizingRejection::RiskOff);
        }
        if position_exists {
            return Err(SizingRejection::PositionExists {
                symbol: asset.symbol.clone(),
            });
        }

        let open_count = positions.iter().filter(|p| p.is_active()).count();
        if open_count >= self.config.max_concurrent_positions {
            return Err(SizingRejection::MaxConcurrentPositions {
                current: open_count,
                limit: self.config.max_concurrent_positions,
            });
        }

        let entry_price = asset.latest_price;
        if entry_price <= 0.0 || !entry_price.is_finite() {
            return Err(SizingRejection::NoPrice {
                symbol: asset.symbol.clone(),
            });
        }

        // Fixed-fractional sizing: loss at the stop equals the risk budget.
        let risk_budget = self.config.risk_per_trade_percent / 100.0 * portfolio.total_value;
        let stop_distance = entry_price * self.config.default_stop_loss_pct;
        let raw_quantity = risk_budget / stop_distance;
        let notional = raw_quantity * entry_price;

        let projected = self.deployed_today + notional;
        if projected > self.config.max_daily_deployment {
            return Err(SizingRejection::DailyDeploymentExceeded {
                deployed: self.deployed_today,
                requested: notional,
                limit: self.config.max_daily_deployment,
            });
        }

        if portfolio.portfolio_var_percent >= self.config.max_portfolio_var_percent {
            return Err(SizingRejection::VarCeilingExceeded {
                var_percent: portfolio.portfolio_var_percent,
                limit_percent: self.config.max_portfolio_var_percent,
            });
        }

        let quantity = Quantity::new(raw_quantity).map_err(|_| SizingRejection::NoPrice {
            symbol: asset.symbol.clone(),
        })?;
        let reference_price = Price::new(entry_price).map_err(|_| SizingRejection::NoPrice {
            symbol: asset.symbol.clone(),
        })?;

        // Reserve before returning.
        self.deployed_today = projected;

        info!(
            symbol = %asset.symbol,
            quantity = raw_quantity,
            notional,
            risk_budget,
            deployed_today = self.deployed_today,
            "position sizing approved"
        );

        Ok(ApprovedOrder {
            symbol: asset.symbol.clone(),
            side: TradeSide::Buy,
            quantity,
            reference_price,
            stop_loss_pct: self.config.default_stop_loss_pct,
            take_profit_pct: self.config.default_take_profit_pct,
            intent: OrderIntent::Entry,
            risk_budget,
        })
    }

    /// Release a reservation when execution of an approved entry failed.
    pub fn release_deployment(&mut self, notional: f64) {
        self.deployed_today = (self.deployed_today - notional).max(0.0);
    }

    /// Recompute portfolio metrics from scratch. `prices` maps symbol to the
    /// latest close; `volatilities` maps symbol to short-window realized
    /// volatility used in the VaR estimate.
    pub fn assess_portfolio_risk(
        &self,
        available_cash: f64,
        realized_pnl: f64,
        positions: &[Position],
        prices: &HashMap<String, f64>,
        volatilities: &HashMap<String, f64>,
    ) -> PortfolioMetrics {
        let mut position_value = 0.0;
        let mut unrealized_pnl = 0.0;
        let mut portfolio_var = 0.0;
        let mut open_positions = 0;

        for position in positions.iter().filter(|p| p.is_active()) {
            open_positions += 1;
            let current = prices
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.entry_price.value());
            let value = position.quantity.value() * current;
            position_value += value;
            unrealized_pnl += (current - position.entry_price.value()) * position.quantity.value();
            let vol = volatilities.get(&position.symbol).copied().unwrap_or(0.0);
            portfolio_var += value * vol * VAR_Z_SCORE;
        }

        let total_value = available_cash + position_value;
        let portfolio_var_percent = if total_value > 0.0 {
            portfolio_var / total_value * 100.0
        } else {
            0.0
        };

        PortfolioMetrics {
            total_value,
            total_pnl: realized_pnl + unrealized_pnl,
            portfolio_var,
            portfolio_var_percent,
            open_positions,
            deployed_today: self.deployed_today,
        }
    }

    /// Refresh the portfolio-wide risk-off flag from realized volatilities
    /// of the tracked active assets. Returns `Some(flag)` on a transition,
    /// `None` when the state is unchanged.
    pub fn update_market_state(&mut self, volatilities: &HashMap<String, f64>) -> Option<bool> {
        let breached: Vec<&String> = volatilities
            .iter()
            .filter(|(_, &vol)| vol > self.config.black_swan_volatility_threshold)
            .map(|(symbol, _)| symbol)
            .collect();

        let next = !breached.is_empty();
        if next == self.risk_off {
            return None;
        }
        self.risk_off = next;
        if next {
            warn!(symbols = ?breached, "black-swan volatility breach, entering risk-off");
        } else {
            info!("volatility back under threshold, clearing risk-off");
        }
        Some(next)
    }

    pub fn is_risk_off(&self) -> bool {
        self.risk_off
    }

    pub fn liquidation_policy(&self) -> LiquidationPolicy {
        self.config.liquidation_policy
    }

    /// Human-readable aggregation of portfolio risk, including per-position
    /// contribution to VaR.
    pub fn get_risk_report(
        &self,
        metrics: &PortfolioMetrics,
        positions: &[Position],
        prices: &HashMap<String, f64>,
        volatilities: &HashMap<String, f64>,
    ) -> String {
        let mut report = String::new();
        report.push_str("=== Portfolio Risk Report ===\n");
        report.push_str(&format!("total value:     {:.2}\n", metrics.total_value));
        report.push_str(&format!("total P&L:       {:.2}\n", metrics.total_pnl));
        report.push_str(&format!(
            "portfolio VaR:   {:.2} ({:.2}% of value, ceiling {:.2}%)\n",
            metrics.portfolio_var,
            metrics.portfolio_var_percent,
            self.config.max_portfolio_var_percent
        ));
        report.push_str(&format!(
            "open positions:  {} of {}\n",
            metrics.open_positions, self.config.max_concurrent_positions
        ));
        report.push_str(&format!(
            "deployed today:  {:.2} of {:.2}\n",
            metrics.deployed_today, self.config.max_daily_deployment
        ));
        report.push_str(&format!(
            "risk-off:        {}\n",
            if self.risk_off { "ACTIVE" } else { "clear" }
        ));

        for position in positions.iter().filter(|p| p.is_active()) {
            let current = prices
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.entry_price.value());
            let value = position.quantity.value() * current;
            let vol = volatilities.get(&position.symbol).copied().unwrap_or(0.0);
            report.push_str(&format!(
                "  {}: value {:.2}, VaR contribution {:.2}\n",
                position.symbol,
                value,
                value * vol * VAR_Z_SCORE
            ));
        }

        report
    }

    fn roll_deployment_day(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.deployment_day {
            self.deployment_day = today;
            self.deployed_today = 0.0;
        }
    }
}
