//! Port traits the decision core talks through.

pub mod config_port;
pub mod execution_port;
pub mod market_data_port;
