//! Core domain types and logic.

pub mod activity_log;
pub mod adjustment;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod ohlcv;
pub mod orchestrator;
pub mod position;
pub mod regime;
pub mod risk;
pub mod signal;
