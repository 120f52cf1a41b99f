//! Market regime classification.
//!
//! Volatility comes from ATR relative to the latest close, trend from the
//! ADX. The pair maps onto one of four regimes; anything else is
//! `Uncertain`. Structurally invalid input or an indicator failure yields
//! `Unknown` on every field. Classification never returns an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::domain::error::IndicatorError;
use crate::domain::indicator::adx::calculate_adx;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::ohlcv::{check_series, OhlcvBar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    High,
    Low,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Trending,
    Ranging,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    TrendingHighVol,
    TrendingLowVol,
    RangingHighVol,
    RangingLowVol,
    Uncertain,
    Unknown,
}

impl Regime {
    /// Exhaustive (trend, volatility) mapping.
    pub fn from_components(trend: Trend, volatility: Volatility) -> Self {
        match (trend, volatility) {
            (Trend::Trending, Volatility::High) => Regime::TrendingHighVol,
            (Trend::Trending, Volatility::Low) => Regime::TrendingLowVol,
            (Trend::Ranging, Volatility::High) => Regime::RangingHighVol,
            (Trend::Ranging, Volatility::Low) => Regime::RangingLowVol,
            _ => Regime::Uncertain,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Regime::TrendingHighVol => "TRENDING_HIGH_VOL",
            Regime::TrendingLowVol => "TRENDING_LOW_VOL",
            Regime::RangingHighVol => "RANGING_HIGH_VOL",
            Regime::RangingLowVol => "RANGING_LOW_VOL",
            Regime::Uncertain => "UNCERTAIN",
            Regime::Unknown => "UNKNOWN",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub volatility: Volatility,
    pub trend: Trend,
    pub regime: Regime,
}

impl MarketConditions {
    pub fn from_components(volatility: Volatility, trend: Trend) -> Self {
        MarketConditions {
            volatility,
            trend,
            regime: Regime::from_components(trend, volatility),
        }
    }

    pub fn unknown() -> Self {
        MarketConditions {
            volatility: Volatility::Unknown,
            trend: Trend::Unknown,
            regime: Regime::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    /// ATR / close above this ratio counts as high volatility.
    pub volatility_threshold: f64,
    /// ADX above this value counts as trending.
    pub trend_strength_threshold: f64,
    pub atr_period: usize,
    pub adx_period: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        RegimeConfig {
            volatility_threshold: 0.02,
            trend_strength_threshold: 20.0,
            atr_period: 14,
            adx_period: 14,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        info!(
            volatility_threshold = config.volatility_threshold,
            trend_strength_threshold = config.trend_strength_threshold,
            "regime classifier initialized"
        );
        RegimeClassifier { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    pub fn classify(&self, bars: &[OhlcvBar]) -> MarketConditions {
        if let Err(defect) = check_series(bars) {
            warn!(?defect, "cannot analyze market conditions");
            return MarketConditions::unknown();
        }

        match self.try_classify(bars) {
            Ok(conditions) => {
                info!(
                    regime = %conditions.regime,
                    volatility = ?conditions.volatility,
                    trend = ?conditions.trend,
                    "market conditions analyzed"
                );
                conditions
            }
            Err(e) => {
                error!(error = %e, "market condition analysis failed");
                MarketConditions::unknown()
            }
        }
    }

    fn try_classify(&self, bars: &[OhlcvBar]) -> Result<MarketConditions, IndicatorError> {
        let atr = calculate_atr(bars, self.config.atr_period)?.latest();
        let volatility = self.classify_volatility(atr, bars.last().map(|b| b.close));

        let adx = calculate_adx(bars, self.config.adx_period)?.latest();
        let trend = self.classify_trend(adx);

        debug!(?atr, ?adx, "regime indicators");
        Ok(MarketConditions::from_components(volatility, trend))
    }

    fn classify_volatility(&self, atr: Option<f64>, close: Option<f64>) -> Volatility {
        let ratio = match (atr, close) {
            (Some(atr), Some(close)) if atr.is_finite() && close != 0.0 => atr / close,
            _ => return Volatility::Unknown,
        };
        if !ratio.is_finite() {
            Volatility::Unknown
        } else if ratio > self.config.volatility_threshold {
            Volatility::High
        } else {
            Volatility::Low
        }
    }

    fn classify_trend(&self, adx: Option<f64>) -> Trend {
        match adx {
            Some(v) if v.is_finite() => {
                if v > self.config.trend_strength_threshold {
                    Trend::Trending
                } else {
                    Trend::Ranging
                }
            }
            _ => Trend::Unknown,
        }
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        RegimeClassifier::new(RegimeConfig::default())
    }
}
