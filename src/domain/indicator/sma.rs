//! Simple Moving Average over closes or volumes.
//!
//! SMA(n)[i] = sum(x[i-n+1..=i]) / n
//! Warmup: first (n-1) bars are undefined, as is any window holding a
//! non-finite input.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{require_period, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Sma(period);
    require_period(&indicator_type, period)?;
    Ok(rolling_mean(bars, period, indicator_type, |b| b.close))
}

pub fn calculate_volume_sma(
    bars: &[OhlcvBar],
    period: usize,
) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::VolumeSma(period);
    require_period(&indicator_type, period)?;
    Ok(rolling_mean(bars, period, indicator_type, |b| b.volume))
}

fn rolling_mean(
    bars: &[OhlcvBar],
    period: usize,
    indicator_type: IndicatorType,
    field: impl Fn(&OhlcvBar) -> f64,
) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let value = if i + 1 >= period {
                let window = &bars[i + 1 - period..=i];
                if window.iter().all(|b| field(b).is_finite()) {
                    Some(window.iter().map(&field).sum::<f64>() / period as f64)
                } else {
                    None
                }
            } else {
                None
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                value,
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
