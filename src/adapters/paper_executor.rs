//! In-memory simulated broker.
//!
//! Market orders fill immediately at the request's reference price and
//! net into one signed position per symbol. Limit orders and bracket
//! legs are stored so they can be modified or cancelled, but never fill.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::domain::error::TraderError;
use crate::ports::execution_port::{
    BrokerPosition, ExecutionPort, OrderId, OrderModification, OrderRequest, OrderSide, OrderType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub request: OrderRequest,
    pub filled: bool,
}

#[derive(Debug, Default)]
struct Book {
    balance: f64,
    next_id: u64,
    orders: HashMap<OrderId, PaperOrder>,
    positions: HashMap<String, BrokerPosition>,
    prices: HashMap<String, f64>,
}

impl Book {
    /// Net a fill into the symbol's position; returns realized PnL.
    fn apply_fill(&mut self, symbol: &str, signed_qty: f64, price: f64) -> f64 {
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| BrokerPosition {
                symbol: symbol.to_string(),
                quantity: 0.0,
                average_price: 0.0,
            });

        let mut realized = 0.0;
        let current = position.quantity;
        if current == 0.0 || current.signum() == signed_qty.signum() {
            let total = current + signed_qty;
            position.average_price =
                (position.average_price * current.abs() + price * signed_qty.abs()) / total.abs();
            position.quantity = total;
        } else {
            let closed = current.abs().min(signed_qty.abs());
            realized = closed * (price - position.average_price) * current.signum();
            let total = current + signed_qty;
            if total.abs() < f64::EPSILON {
                position.quantity = 0.0;
            } else if total.signum() != current.signum() {
                position.quantity = total;
                position.average_price = price;
            } else {
                position.quantity = total;
            }
        }

        if position.quantity == 0.0 {
            self.positions.remove(symbol);
        }
        realized
    }
}

pub struct PaperExecutor {
    book: Mutex<Book>,
}

impl PaperExecutor {
    pub fn new(starting_balance: f64) -> Self {
        info!(starting_balance, "paper executor initialized");
        Self {
            book: Mutex::new(Book {
                balance: starting_balance,
                next_id: 1,
                ..Book::default()
            }),
        }
    }

    pub fn order(&self, order_id: &str) -> Result<Option<PaperOrder>, TraderError> {
        Ok(self.lock()?.orders.get(order_id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Book>, TraderError> {
        self.book.lock().map_err(|_| TraderError::Execution {
            reason: "paper book lock poisoned".into(),
        })
    }
}

fn validate(request: &OrderRequest) -> Result<(), TraderError> {
    if !(request.quantity > 0.0 && request.quantity.is_finite()) {
        warn!(symbol = %request.symbol, quantity = request.quantity, "invalid order quantity");
        return Err(TraderError::Execution {
            reason: format!("invalid quantity {} for {}", request.quantity, request.symbol),
        });
    }
    if request.order_type == OrderType::Limit && request.price.is_none() {
        warn!(symbol = %request.symbol, "limit order requires a price");
        return Err(TraderError::Execution {
            reason: "limit order requires a price".into(),
        });
    }
    if request.order_type == OrderType::Market && request.price.is_some() {
        warn!(symbol = %request.symbol, "price specified for market order, ignoring");
    }
    Ok(())
}

impl ExecutionPort for PaperExecutor {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderId, TraderError> {
        validate(request)?;
        let mut book = self.lock()?;

        let order_id = format!("paper-{}", book.next_id);
        book.next_id += 1;

        let filled = match request.order_type {
            OrderType::Market => {
                let price = request
                    .reference_price
                    .filter(|p| *p > 0.0)
                    .ok_or_else(|| TraderError::Execution {
                        reason: format!("no reference price to fill {}", request.symbol),
                    })?;
                let signed = match request.side {
                    OrderSide::Buy => request.quantity,
                    OrderSide::Sell => -request.quantity,
                };
                let realized = book.apply_fill(&request.symbol, signed, price);
                book.balance += realized;
                book.prices.insert(request.symbol.clone(), price);
                info!(
                    %order_id,
                    symbol = %request.symbol,
                    side = %request.side,
                    quantity = request.quantity,
                    price,
                    realized,
                    "paper market order filled"
                );
                true
            }
            OrderType::Limit => {
                info!(%order_id, symbol = %request.symbol, price = ?request.price, "paper limit order resting");
                false
            }
        };

        book.orders.insert(
            order_id.clone(),
            PaperOrder {
                request: request.clone(),
                filled,
            },
        );
        Ok(order_id)
    }

    fn modify_order(
        &self,
        order_id: &str,
        modification: &OrderModification,
    ) -> Result<bool, TraderError> {
        let mut book = self.lock()?;
        let Some(order) = book.orders.get_mut(order_id) else {
            warn!(order_id, "cannot modify unknown order");
            return Ok(false);
        };
        if let Some(price) = modification.price {
            order.request.price = Some(price);
        }
        if let Some(stop) = modification.stop_loss {
            order.request.stop_loss = Some(stop);
        }
        if let Some(target) = modification.take_profit {
            order.request.take_profit = Some(target);
        }
        info!(order_id, ?modification, "paper order modified");
        Ok(true)
    }

    fn cancel_order(&self, order_id: &str) -> Result<bool, TraderError> {
        let removed = self.lock()?.orders.remove(order_id).is_some();
        if removed {
            info!(order_id, "paper order cancelled");
        } else {
            warn!(order_id, "cannot cancel unknown order");
        }
        Ok(removed)
    }

    fn get_balance(&self) -> Result<f64, TraderError> {
        Ok(self.lock()?.balance)
    }

    fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, TraderError> {
        let book = self.lock()?;
        let mut positions: Vec<BrokerPosition> = book.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn get_current_price(&self, symbol: &str) -> Result<f64, TraderError> {
        self.lock()?
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| TraderError::Execution {
                reason: format!("no price for {}", symbol),
            })
    }

    fn mark_price(&self, symbol: &str, price: f64) -> Result<(), TraderError> {
        if !(price > 0.0 && price.is_finite()) {
            warn!(symbol, price, "ignoring invalid mark price");
            return Ok(());
        }
        self.lock()?.prices.insert(symbol.to_string(), price);
        Ok(())
    }
}
