//! Order intents and the positions the agent opened from them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn from_signal(signal: Signal) -> Option<Self> {
        match signal {
            Signal::Buy => Some(PositionSide::Long),
            Signal::Sell => Some(PositionSide::Short),
            Signal::Hold => None,
        }
    }

    pub fn is_long(self) -> bool {
        self == PositionSide::Long
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("long"),
            PositionSide::Short => f.write_str("short"),
        }
    }
}

/// A sized, risk-bounded trade the agent wants to enter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionIntent {
    pub side: PositionSide,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: NaiveDateTime,
    pub order_id: String,
}

impl OpenPosition {
    pub fn from_intent(
        symbol: &str,
        intent: &PositionIntent,
        opened_at: NaiveDateTime,
        order_id: String,
    ) -> Self {
        OpenPosition {
            symbol: symbol.to_string(),
            side: intent.side,
            quantity: intent.quantity,
            entry_price: intent.entry_price,
            stop_loss: intent.stop_loss_price,
            take_profit: intent.take_profit_price,
            opened_at,
            order_id,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side.is_long()
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.quantity * (price - self.entry_price),
            PositionSide::Short => self.quantity * (self.entry_price - price),
        }
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            PositionSide::Long => price <= self.stop_loss,
            PositionSide::Short => price >= self.stop_loss,
        }
    }

    pub fn target_hit(&self, price: f64) -> bool {
        match self.side {
            PositionSide::Long => price >= self.take_profit,
            PositionSide::Short => price <= self.take_profit,
        }
    }
}
