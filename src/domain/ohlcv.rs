//! OHLCV bar representation and bar-series checks.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// True when every price and the volume are finite numbers.
    pub fn is_complete(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }

    fn has_hlc(&self) -> bool {
        self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// Why a bar series cannot be analysed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesDefect {
    Empty,
    MissingPrice { index: usize },
    OutOfOrder { index: usize },
}

/// Check the structural preconditions every analysis relies on: a non-empty
/// series, finite high/low/close on every bar and strictly increasing timestamps.
pub fn check_series(bars: &[OhlcvBar]) -> Result<(), SeriesDefect> {
    if bars.is_empty() {
        return Err(SeriesDefect::Empty);
    }
    for (i, bar) in bars.iter().enumerate() {
        if !bar.has_hlc() {
            return Err(SeriesDefect::MissingPrice { index: i });
        }
        if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
            return Err(SeriesDefect::OutOfOrder { index: i });
        }
    }
    Ok(())
}
