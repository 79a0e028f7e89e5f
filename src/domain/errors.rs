use thiserror::Error;

/// Fatal configuration errors. Any of these aborts startup; the pipeline
/// never runs with a partially valid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("analysis weights must sum to 1.0, got {sum:.6}")]
    WeightsNotNormalized { sum: f64 },

    #[error("analysis weight {name} must be in [0.0, 1.0], got {value}")]
    WeightOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositiveValue { name: &'static str, value: f64 },

    #[error("{name} must be within ({min}, {max}), got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("analysis interval ({analysis} min) must be >= data refresh interval ({refresh} min)")]
    AnalysisIntervalTooShort { analysis: u64, refresh: u64 },

    #[error("signal strength ceiling ({ceiling}) must be >= signal threshold ({threshold})")]
    CeilingBelowThreshold { ceiling: f64, threshold: f64 },

    #[error("failed to parse {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("at least one tracked symbol is required")]
    NoSymbols,
}

/// Expected business outcomes of position sizing. These are not faults:
/// the scheduler logs them at info level and moves on to the next asset.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingRejection {
    #[error("signal is HOLD, nothing to size")]
    HoldSignal,

    #[error("active position already exists for {symbol}")]
    PositionExists { symbol: String },

    #[error("max concurrent positions reached: {current} of {limit}")]
    MaxConcurrentPositions { current: usize, limit: usize },

    #[error(
        "daily deployment cap exceeded: deployed {deployed:.2} + requested {requested:.2} > {limit:.2}"
    )]
    DailyDeploymentExceeded {
        deployed: f64,
        requested: f64,
        limit: f64,
    },

    #[error("portfolio VaR {var_percent:.2}% at or above ceiling {limit_percent:.2}%")]
    VarCeilingExceeded {
        var_percent: f64,
        limit_percent: f64,
    },

    #[error("risk-off state active, new entries blocked")]
    RiskOff,

    #[error("no active position to exit for {symbol}")]
    NoPositionToExit { symbol: String },

    #[error("no usable price for {symbol}")]
    NoPrice { symbol: String },
}

/// Per-asset execution failures. Recoverable: the failed asset is reported
/// and skipped, the cycle continues with the next one.
#[derive(Debug, Clone, Error)]
pub enum ExecutionFailure {
    #[error("exchange rejected order for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("order placement timed out after {timeout_ms}ms for {symbol}")]
    Timeout { symbol: String, timeout_ms: u64 },

    #[error("network fault talking to exchange: {0}")]
    Network(String),

    #[error("an order is already outstanding for {symbol}")]
    OutstandingOrder { symbol: String },

    #[error("storage fault while recording execution: {0}")]
    Storage(String),
}

/// Shared-infrastructure faults. These abort the current cycle; the
/// scheduler retries on the next interval instead of terminating.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("data provider unavailable: {0}")]
    DataUnavailable(String),
}

/// Value-object construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("price must be non-negative and finite")]
    InvalidPrice,

    #[error("quantity must be non-negative and finite")]
    InvalidQuantity,
}
