//! Three-factor directional signal.
//!
//! Each bar becomes a [`SignalRow`] once every indicator it needs is
//! defined. Only the most recent complete row is evaluated:
//! - trend: short SMA vs long SMA of close
//! - structure: bar is a rolling swing low (BUY) or swing high (SELL)
//! - participation: close vs long SMA, and a positive volume SMA
//!
//! All three factors must agree; anything else is HOLD.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::domain::error::IndicatorError;
use crate::domain::indicator::extrema::{calculate_rolling_high, calculate_rolling_low};
use crate::domain::indicator::sma::{calculate_sma, calculate_volume_sma};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn is_directional(self) -> bool {
        !matches!(self, Signal::Hold)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => f.write_str("BUY"),
            Signal::Sell => f.write_str("SELL"),
            Signal::Hold => f.write_str("HOLD"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub short_period: usize,
    pub long_period: usize,
    pub swing_lookback: usize,
    pub volume_period: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            short_period: 14,
            long_period: 50,
            swing_lookback: 20,
            volume_period: 20,
        }
    }
}

/// Every value the decision rule reads for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRow {
    pub close: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub swing_high: bool,
    pub swing_low: bool,
    pub volume_sma: f64,
}

impl SignalRow {
    pub fn trend_up(&self) -> bool {
        self.sma_short > self.sma_long
    }

    pub fn trend_down(&self) -> bool {
        self.sma_short < self.sma_long
    }

    pub fn participation_up(&self) -> bool {
        self.close > self.sma_long && self.volume_sma > 0.0
    }

    pub fn participation_down(&self) -> bool {
        self.close < self.sma_long && self.volume_sma > 0.0
    }

    pub fn decide(&self) -> Signal {
        if self.trend_up() && self.swing_low && self.participation_up() {
            Signal::Buy
        } else if self.trend_down() && self.swing_high && self.participation_down() {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        SignalGenerator { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn generate(&self, bars: &[OhlcvBar]) -> Signal {
        if bars.is_empty() {
            warn!("input data is empty, cannot generate signal");
            return Signal::Hold;
        }

        let rows = match self.rows(bars) {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "signal indicators failed");
                return Signal::Hold;
            }
        };

        let Some(latest) = rows.into_iter().rev().flatten().next() else {
            warn!(bars = bars.len(), "no complete indicator rows, cannot generate signal");
            return Signal::Hold;
        };

        let signal = latest.decide();
        debug!(?latest, "latest signal row");
        info!(%signal, "generated signal");
        signal
    }

    /// One entry per bar; `None` where any input or indicator is undefined.
    pub fn rows(&self, bars: &[OhlcvBar]) -> Result<Vec<Option<SignalRow>>, IndicatorError> {
        let sma_short = calculate_sma(bars, self.config.short_period)?;
        let sma_long = calculate_sma(bars, self.config.long_period)?;
        let rolling_high = calculate_rolling_high(bars, self.config.swing_lookback)?;
        let rolling_low = calculate_rolling_low(bars, self.config.swing_lookback)?;
        let volume_sma = calculate_volume_sma(bars, self.config.volume_period)?;

        Ok(bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                if !bar.is_complete() {
                    return None;
                }
                Some(SignalRow {
                    close: bar.close,
                    sma_short: sma_short.get(i)?,
                    sma_long: sma_long.get(i)?,
                    swing_high: rolling_high.get(i) == Some(bar.high),
                    swing_low: rolling_low.get(i) == Some(bar.low),
                    volume_sma: volume_sma.get(i)?,
                })
            })
            .collect())
    }
}
