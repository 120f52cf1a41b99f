//! Order execution port trait and the order types it exchanges.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::TraderError;
use crate::domain::position::PositionSide;

pub type OrderId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens a position on `side`.
    pub fn opening(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side that flattens a position on `side`.
    pub fn closing(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Limit price; required for `OrderType::Limit`.
    pub price: Option<f64>,
    /// Last known price, used by simulated brokers to fill market orders.
    pub reference_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: f64, reference_price: f64) -> Self {
        OrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            reference_price: Some(reference_price),
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn with_bracket(mut self, stop_loss: f64, take_profit: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderModification {
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// A position as the broker reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    /// Signed: positive long, negative short.
    pub quantity: f64,
    pub average_price: f64,
}

pub trait ExecutionPort {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderId, TraderError>;

    fn modify_order(
        &self,
        order_id: &str,
        modification: &OrderModification,
    ) -> Result<bool, TraderError>;

    fn cancel_order(&self, order_id: &str) -> Result<bool, TraderError>;

    fn get_balance(&self) -> Result<f64, TraderError>;

    fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, TraderError>;

    fn get_current_price(&self, symbol: &str) -> Result<f64, TraderError>;

    /// Latest observed market price for `symbol`. Simulated gateways quote
    /// from it; live gateways have their own feed and ignore it.
    fn mark_price(&self, _symbol: &str, _price: f64) -> Result<(), TraderError> {
        Ok(())
    }
}
