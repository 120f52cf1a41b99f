//! Concrete adapter implementations for ports, and selection by config.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod paper_executor;

use std::path::PathBuf;

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::execution_port::ExecutionPort;
use crate::ports::market_data_port::MarketDataPort;
use csv_adapter::CsvMarketData;
use paper_executor::PaperExecutor;

/// Venues that need network clients this build does not ship.
const UNSUPPORTED_DATA_SOURCES: [&str; 3] = ["alpaca", "binance", "interactive_brokers"];
const UNSUPPORTED_BROKERS: [&str; 4] = ["alpaca", "binance", "oanda", "interactive_brokers"];

fn selection(config: &dyn ConfigPort, key: &str, default: &str) -> String {
    config
        .get_string("agent", key)
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Build the market data source named by `[agent] data_source`.
pub fn market_data_from_config(
    config: &dyn ConfigPort,
) -> Result<Box<dyn MarketDataPort>, TraderError> {
    let name = selection(config, "data_source", "csv");
    match name.as_str() {
        "csv" => {
            let path = config
                .get_string("agent", "data_path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "agent".into(),
                    key: "data_path".into(),
                })?;
            Ok(Box::new(CsvMarketData::new(PathBuf::from(path.trim()))))
        }
        other if UNSUPPORTED_DATA_SOURCES.contains(&other) => Err(TraderError::config_invalid(
            "agent",
            "data_source",
            format!("data source '{other}' is not supported in this build"),
        )),
        other => Err(TraderError::config_invalid(
            "agent",
            "data_source",
            format!("unknown data source '{other}'"),
        )),
    }
}

/// Build the broker named by `[agent] broker`.
pub fn broker_from_config(
    config: &dyn ConfigPort,
    starting_balance: f64,
) -> Result<Box<dyn ExecutionPort>, TraderError> {
    let name = selection(config, "broker", "paper");
    match name.as_str() {
        "paper" => Ok(Box::new(PaperExecutor::new(starting_balance))),
        other if UNSUPPORTED_BROKERS.contains(&other) => Err(TraderError::config_invalid(
            "agent",
            "broker",
            format!("broker '{other}' is not supported in this build"),
        )),
        other => Err(TraderError::config_invalid(
            "agent",
            "broker",
            format!("unknown broker '{other}'"),
        )),
    }
}
