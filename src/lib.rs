//! Astraeus Trading System Library
//!
//! Core components for the Astraeus automated crypto research and trading
//! pipeline: analysis engine, risk manager, trading executor, and the
//! automation scheduler that drives them.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
