pub mod analysis_engine;
pub mod indicators;
pub mod risk_manager;
pub mod trading_executor;
