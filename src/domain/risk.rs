//! Risk bookkeeping: position sizing, stop and target derivation,
//! trailing stops and the daily loss ceiling.
//!
//! `RiskManager` is the only stateful component of the decision core.
//! Its state changes through `record_loss` and `roll_over_day` alone:
//! the daily loss never decreases within a day, and the balance only
//! falls through recorded losses.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::error::TraderError;
use crate::domain::position::PositionSide;

/// Trailing distance below (long) or above (short) the current price.
pub const TRAILING_STOP_PCT: f64 = 0.02;
/// Stop distance in units of the supplied volatility measure.
pub const VOLATILITY_STOP_MULTIPLE: f64 = 1.5;
/// Fallback stop as a fraction of entry when the volatility stop is not positive.
pub const VOLATILITY_STOP_FLOOR: f64 = 0.95;
/// Fallback short target as a fraction of entry when the target is not positive.
pub const SHORT_TARGET_FLOOR: f64 = 0.05;

/// Read-only view of the risk state, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskState {
    pub account_balance: f64,
    pub initial_daily_balance: f64,
    pub risk_per_trade_percentage: f64,
    pub daily_risk_limit_percentage: f64,
    pub daily_loss_incurred: f64,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    state: RiskState,
}

fn check_percentage(field: &str, value: f64) -> Result<(), TraderError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(TraderError::validation(
            field,
            format!("{value} must be between 0 (exclusive) and 1 (inclusive)"),
        ));
    }
    Ok(())
}

impl RiskManager {
    pub fn new(
        account_balance: f64,
        risk_per_trade_percentage: f64,
        daily_risk_limit_percentage: f64,
    ) -> Result<Self, TraderError> {
        check_percentage("risk_per_trade_percentage", risk_per_trade_percentage)?;
        check_percentage("daily_risk_limit_percentage", daily_risk_limit_percentage)?;
        if !(account_balance > 0.0 && account_balance.is_finite()) {
            return Err(TraderError::validation(
                "account_balance",
                format!("{account_balance} must be positive"),
            ));
        }

        info!(
            account_balance,
            risk_per_trade_pct = risk_per_trade_percentage * 100.0,
            daily_risk_limit_pct = daily_risk_limit_percentage * 100.0,
            "risk manager initialized"
        );

        Ok(RiskManager {
            state: RiskState {
                account_balance,
                initial_daily_balance: account_balance,
                risk_per_trade_percentage,
                daily_risk_limit_percentage,
                daily_loss_incurred: 0.0,
            },
        })
    }

    pub fn state(&self) -> RiskState {
        self.state
    }

    pub fn account_balance(&self) -> f64 {
        self.state.account_balance
    }

    pub fn initial_daily_balance(&self) -> f64 {
        self.state.initial_daily_balance
    }

    pub fn daily_loss_incurred(&self) -> f64 {
        self.state.daily_loss_incurred
    }

    /// Loss amount at which trading stops for the day.
    pub fn daily_loss_limit(&self) -> f64 {
        self.state.initial_daily_balance * self.state.daily_risk_limit_percentage
    }

    /// How much more may be lost today before the limit trips.
    pub fn remaining_daily_risk(&self) -> f64 {
        (self.daily_loss_limit() - self.state.daily_loss_incurred).max(0.0)
    }

    /// Quantity that risks `risk_per_trade_percentage` of the balance
    /// between `entry_price` and `stop_loss_price`. Zero when the distance
    /// is undefined.
    pub fn size_position(&self, entry_price: f64, stop_loss_price: f64, asset_multiplier: f64) -> f64 {
        if entry_price <= 0.0 || stop_loss_price <= 0.0 {
            error!(entry_price, stop_loss_price, "entry and stop loss must be positive for sizing");
            return 0.0;
        }
        if !(asset_multiplier > 0.0 && asset_multiplier.is_finite()) {
            error!(asset_multiplier, "asset multiplier must be positive for sizing");
            return 0.0;
        }

        let distance = (entry_price - stop_loss_price).abs();
        if distance == 0.0 {
            warn!(entry_price, "entry equals stop loss, cannot size position");
            return 0.0;
        }

        let risk_amount = self.state.account_balance * self.state.risk_per_trade_percentage;
        let quantity = risk_amount / (distance * asset_multiplier);
        info!(quantity, entry_price, stop_loss_price, "calculated position size");
        quantity
    }

    /// Long-side stop below `entry_price`, either `pct` below it or
    /// 1.5 × `volatility` below it. `pct` wins when both are given.
    pub fn derive_stop_loss(
        &self,
        entry_price: f64,
        pct: Option<f64>,
        volatility: Option<f64>,
    ) -> Option<f64> {
        if entry_price <= 0.0 {
            error!(entry_price, "entry price must be positive to determine stop loss");
            return None;
        }

        if let Some(pct) = pct {
            if !(pct > 0.0 && pct < 1.0) {
                error!(pct, "stop loss percentage must be between 0 and 1");
                return None;
            }
            let stop = entry_price * (1.0 - pct);
            info!(stop, "determined stop loss from percentage");
            return Some(stop);
        }

        if let Some(volatility) = volatility {
            let mut stop = entry_price - volatility * VOLATILITY_STOP_MULTIPLE;
            if stop <= 0.0 {
                warn!(stop, "volatility stop is not positive, falling back to 95% of entry");
                stop = entry_price * VOLATILITY_STOP_FLOOR;
            }
            info!(stop, "determined stop loss from volatility");
            return Some(stop);
        }

        warn!("neither stop percentage nor volatility provided");
        None
    }

    /// Stop for either side: shorts mirror the long stop above entry.
    pub fn derive_stop_for_side(
        &self,
        entry_price: f64,
        side: PositionSide,
        pct: Option<f64>,
        volatility: Option<f64>,
    ) -> Option<f64> {
        let long_stop = self.derive_stop_loss(entry_price, pct, volatility)?;
        match side {
            PositionSide::Long => Some(long_stop),
            PositionSide::Short => Some(entry_price + (entry_price - long_stop)),
        }
    }

    /// Target at `risk_reward_ratio` times the stop distance from entry.
    /// The side is inferred from which side of entry the stop sits.
    pub fn derive_take_profit(
        &self,
        entry_price: f64,
        stop_loss_price: f64,
        risk_reward_ratio: f64,
    ) -> Option<f64> {
        if entry_price <= 0.0 || stop_loss_price <= 0.0 || risk_reward_ratio <= 0.0 {
            error!(
                entry_price,
                stop_loss_price, risk_reward_ratio, "take profit inputs must be positive"
            );
            return None;
        }

        let distance = (entry_price - stop_loss_price).abs() * risk_reward_ratio;
        let target = if entry_price > stop_loss_price {
            entry_price + distance
        } else if entry_price < stop_loss_price {
            let target = entry_price - distance;
            if target <= 0.0 {
                warn!(target, "short take profit is not positive, falling back to 5% of entry");
                entry_price * SHORT_TARGET_FLOOR
            } else {
                target
            }
        } else {
            warn!(entry_price, "entry equals stop loss, cannot determine take profit");
            return None;
        };

        info!(target, entry_price, stop_loss_price, risk_reward_ratio, "determined take profit");
        Some(target)
    }

    /// Ratchet a stop toward price; it never loosens.
    pub fn update_trailing_stop(&self, current_price: f64, current_stop: f64, is_long: bool) -> f64 {
        if is_long {
            let candidate = current_price * (1.0 - TRAILING_STOP_PCT);
            if candidate > current_stop {
                info!(from = current_stop, to = candidate, "trailing stop for long raised");
                return candidate;
            }
        } else {
            let candidate = current_price * (1.0 + TRAILING_STOP_PCT);
            if candidate < current_stop {
                info!(from = current_stop, to = candidate, "trailing stop for short lowered");
                return candidate;
            }
        }
        current_stop
    }

    /// True while the day's losses stay strictly below the limit.
    pub fn daily_limit_ok(&self) -> bool {
        let limit = self.daily_loss_limit();
        let loss = self.state.daily_loss_incurred;
        if loss >= limit {
            warn!(daily_loss = loss, limit, "daily risk limit reached");
            false
        } else {
            info!(daily_loss = loss, limit, "daily risk limit not reached");
            true
        }
    }

    /// Book a realized loss. Non-positive amounts are ignored; returns
    /// whether the state changed.
    pub fn record_loss(&mut self, amount: f64) -> bool {
        if !(amount > 0.0 && amount.is_finite()) {
            warn!(amount, "loss amount must be positive, ignoring");
            return false;
        }
        self.state.daily_loss_incurred += amount;
        self.state.account_balance -= amount;
        info!(
            amount,
            daily_loss = self.state.daily_loss_incurred,
            account_balance = self.state.account_balance,
            "daily loss updated"
        );
        true
    }

    /// Start a new trading day from the current balance.
    pub fn roll_over_day(&mut self) {
        self.state.daily_loss_incurred = 0.0;
        self.state.initial_daily_balance = self.state.account_balance;
        info!(
            initial_daily_balance = self.state.initial_daily_balance,
            "daily loss reset"
        );
    }
}
