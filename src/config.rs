//! Automation configuration. Values come from the environment with sane
//! paper-trading defaults; a malformed value is fatal rather than silently
//! replaced, and `validate` runs before any component is built.

use std::env;
use std::str::FromStr;

use crate::domain::errors::ConfigError;
use crate::domain::services::analysis_engine::AnalysisWeights;
use crate::domain::services::risk_manager::LiquidationPolicy;

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub symbols: Vec<String>,
    pub weights: AnalysisWeights,
    pub signal_threshold: f64,
    pub strength_ceiling: f64,
    pub min_history_len: usize,
    pub data_refresh_interval_minutes: u64,
    pub analysis_interval_minutes: u64,
    pub rebalance_interval_hours: u64,
    pub max_daily_deployment: f64,
    pub max_concurrent_positions: usize,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
    pub risk_per_trade_percent: f64,
    pub max_portfolio_var_percent: f64,
    pub black_swan_volatility_threshold: f64,
    pub external_call_timeout_ms: u64,
    pub initial_capital: f64,
    pub liquidation_policy: LiquidationPolicy,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        AutomationConfig {
            symbols: vec![
                "BTC-USD".to_string(),
                "ETH-USD".to_string(),
                "SOL-USD".to_string(),
            ],
            weights: AnalysisWeights {
                technical: 0.5,
                fundamental: 0.3,
                sentiment: 0.2,
            },
            signal_threshold: 0.3,
            strength_ceiling: 0.8,
            min_history_len: 30,
            data_refresh_interval_minutes: 5,
            analysis_interval_minutes: 15,
            rebalance_interval_hours: 4,
            max_daily_deployment: 50_000.0,
            max_concurrent_positions: 5,
            default_stop_loss_pct: 0.02,
            default_take_profit_pct: 0.05,
            risk_per_trade_percent: 1.0,
            max_portfolio_var_percent: 10.0,
            black_swan_volatility_threshold: 0.15,
            external_call_timeout_ms: 10_000,
            initial_capital: 100_000.0,
            liquidation_policy: LiquidationPolicy::BlockEntriesOnly,
        }
    }
}

impl AutomationConfig {
    /// Build from environment variables, falling back to defaults for unset
    /// ones. A set-but-malformed variable is a [`ConfigError`]: startup
    /// aborts instead of running with a value the operator did not intend.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let symbols = match env::var("TRACKED_SYMBOLS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.symbols,
        };

        let liquidation_policy = match env::var("LIQUIDATION_POLICY") {
            Ok(raw) => match raw.to_ascii_lowercase().as_str() {
                "block_entries" => LiquidationPolicy::BlockEntriesOnly,
                "force_liquidate" => LiquidationPolicy::ForceLiquidate,
                other => {
                    return Err(ConfigError::InvalidValue {
                        name: "LIQUIDATION_POLICY",
                        reason: format!(
                            "expected block_entries or force_liquidate, got {other}"
                        ),
                    })
                }
            },
            Err(_) => defaults.liquidation_policy,
        };

        let config = AutomationConfig {
            symbols,
            weights: AnalysisWeights {
                technical: parse_env("WEIGHT_TECHNICAL", defaults.weights.technical)?,
                fundamental: parse_env("WEIGHT_FUNDAMENTAL", defaults.weights.fundamental)?,
                sentiment: parse_env("WEIGHT_SENTIMENT", defaults.weights.sentiment)?,
            },
            signal_threshold: parse_env("SIGNAL_THRESHOLD", defaults.signal_threshold)?,
            strength_ceiling: parse_env("STRENGTH_CEILING", defaults.strength_ceiling)?,
            min_history_len: parse_env("MIN_HISTORY_LEN", defaults.min_history_len)?,
            data_refresh_interval_minutes: parse_env(
                "DATA_REFRESH_INTERVAL_MINUTES",
                defaults.data_refresh_interval_minutes,
            )?,
            analysis_interval_minutes: parse_env(
                "ANALYSIS_INTERVAL_MINUTES",
                defaults.analysis_interval_minutes,
            )?,
            rebalance_interval_hours: parse_env(
                "REBALANCE_INTERVAL_HOURS",
                defaults.rebalance_interval_hours,
            )?,
            max_daily_deployment: parse_env(
                "MAX_DAILY_DEPLOYMENT",
                defaults.max_daily_deployment,
            )?,
            max_concurrent_positions: parse_env(
                "MAX_CONCURRENT_POSITIONS",
                defaults.max_concurrent_positions,
            )?,
            default_stop_loss_pct: parse_env(
                "DEFAULT_STOP_LOSS_PCT",
                defaults.default_stop_loss_pct,
            )?,
            default_take_profit_pct: parse_env(
                "DEFAULT_TAKE_PROFIT_PCT",
                defaults.default_take_profit_pct,
            )?,
            risk_per_trade_percent: parse_env(
                "RISK_PER_TRADE_PERCENT",
                defaults.risk_per_trade_percent,
            )?,
            max_portfolio_var_percent: parse_env(
                "MAX_PORTFOLIO_VAR_PERCENT",
                defaults.max_portfolio_var_percent,
            )?,
            black_swan_volatility_threshold: parse_env(
                "BLACK_SWAN_VOLATILITY_THRESHOLD",
                defaults.black_swan_volatility_threshold,
            )?,
            external_call_timeout_ms: parse_env(
                "EXTERNAL_CALL_TIMEOUT_MS",
                defaults.external_call_timeout_ms,
            )?,
            initial_capital: parse_env("INITIAL_CAPITAL", defaults.initial_capital)?,
            liquidation_policy,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        self.weights.validate()?;

        check_positive("signal_threshold", self.signal_threshold)?;
        if self.strength_ceiling < self.signal_threshold {
            return Err(ConfigError::CeilingBelowThreshold {
                ceiling: self.strength_ceiling,
                threshold: self.signal_threshold,
            });
        }

        check_positive(
            "data_refresh_interval_minutes",
            self.data_refresh_interval_minutes as f64,
        )?;
        check_positive(
            "analysis_interval_minutes",
            self.analysis_interval_minutes as f64,
        )?;
        check_positive(
            "rebalance_interval_hours",
            self.rebalance_interval_hours as f64,
        )?;
        if self.analysis_interval_minutes < self.data_refresh_interval_minutes {
            return Err(ConfigError::AnalysisIntervalTooShort {
                analysis: self.analysis_interval_minutes,
                refresh: self.data_refresh_interval_minutes,
            });
        }

        check_positive("max_daily_deployment", self.max_daily_deployment)?;
        check_positive(
            "max_concurrent_positions",
            self.max_concurrent_positions as f64,
        )?;
        check_positive("min_history_len", self.min_history_len as f64)?;
        check_positive("initial_capital", self.initial_capital)?;
        check_positive(
            "external_call_timeout_ms",
            self.external_call_timeout_ms as f64,
        )?;
        check_positive(
            "black_swan_volatility_threshold",
            self.black_swan_volatility_threshold,
        )?;

        check_fraction("default_stop_loss_pct", self.default_stop_loss_pct)?;
        check_fraction("default_take_profit_pct", self.default_take_profit_pct)?;
        check_percent("risk_per_trade_percent", self.risk_per_trade_percent)?;
        check_percent("max_portfolio_var_percent", self.max_portfolio_var_percent)?;

        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveValue { name, value })
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn check_percent(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 100.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min: 0.0,
            max: 100.0,
        })
    }
}
