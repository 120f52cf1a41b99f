//! Strategy and risk adjustments suggested per market regime.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::regime::{MarketConditions, Regime, Volatility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    TrendFollowing,
    RangeBound,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyAdjustment {
    pub strategy_type: StrategyType,
    pub risk_per_trade_multiplier: f64,
    pub stop_loss_multiplier: f64,
    pub take_profit_multiplier: f64,
}

impl StrategyAdjustment {
    const fn new(strategy_type: StrategyType, risk: f64, stop_loss: f64, take_profit: f64) -> Self {
        StrategyAdjustment {
            strategy_type,
            risk_per_trade_multiplier: risk,
            stop_loss_multiplier: stop_loss,
            take_profit_multiplier: take_profit,
        }
    }

    /// Conservative fallback for unknown and uncertain regimes.
    pub const HOLD: StrategyAdjustment = StrategyAdjustment::new(StrategyType::Hold, 0.5, 1.0, 1.0);

    pub fn is_hold(&self) -> bool {
        self.strategy_type == StrategyType::Hold
    }
}

/// Base adjustment for a regime, before the volatility post-adjustment.
pub fn base_adjustment(regime: Regime) -> StrategyAdjustment {
    use StrategyType::*;
    match regime {
        Regime::TrendingHighVol => StrategyAdjustment::new(TrendFollowing, 0.8, 1.5, 2.0),
        Regime::TrendingLowVol => StrategyAdjustment::new(TrendFollowing, 1.0, 1.0, 1.5),
        Regime::RangingHighVol => StrategyAdjustment::new(RangeBound, 0.6, 1.8, 1.2),
        Regime::RangingLowVol => StrategyAdjustment::new(RangeBound, 1.0, 1.0, 1.0),
        Regime::Uncertain | Regime::Unknown => StrategyAdjustment::HOLD,
    }
}

/// Stop-loss scaling applied on top of the regime table.
pub fn volatility_stop_factor(volatility: Volatility) -> f64 {
    match volatility {
        Volatility::High => 1.2,
        Volatility::Low => 0.8,
        Volatility::Unknown => 1.0,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdjustmentAdvisor;

impl AdjustmentAdvisor {
    pub fn new() -> Self {
        AdjustmentAdvisor
    }

    pub fn suggest(&self, conditions: &MarketConditions) -> StrategyAdjustment {
        let mut adjustment = base_adjustment(conditions.regime);
        adjustment.stop_loss_multiplier *= volatility_stop_factor(conditions.volatility);
        info!(
            regime = %conditions.regime,
            strategy = ?adjustment.strategy_type,
            risk_multiplier = adjustment.risk_per_trade_multiplier,
            stop_loss_multiplier = adjustment.stop_loss_multiplier,
            take_profit_multiplier = adjustment.take_profit_multiplier,
            "suggested strategy adjustment"
        );
        adjustment
    }
}
