//! Average True Range.
//!
//! TR[0] = high - low; TR[i] = max(high-low, |high-prev_close|, |low-prev_close|).
//! Seed with the mean of the first `period` true ranges, then Wilder
//! smoothing: ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.
//! Warmup: first (n-1) bars are undefined.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{
    require_period, wilder_smooth, IndicatorPoint, IndicatorSeries, IndicatorType,
};
use crate::domain::ohlcv::OhlcvBar;

/// True range per bar; undefined where a required price is not finite.
pub fn true_range(bars: &[OhlcvBar]) -> Vec<Option<f64>> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if !bar.high.is_finite() || !bar.low.is_finite() {
                return None;
            }
            if i == 0 {
                return Some(bar.high - bar.low);
            }
            let prev_close = bars[i - 1].close;
            if prev_close.is_finite() {
                Some(bar.true_range(prev_close))
            } else {
                None
            }
        })
        .collect()
}

pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Atr(period);
    require_period(&indicator_type, period)?;

    let smoothed = wilder_smooth(&true_range(bars), period);
    let values = bars
        .iter()
        .zip(smoothed)
        .map(|(bar, value)| IndicatorPoint {
            timestamp: bar.timestamp,
            value,
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}
