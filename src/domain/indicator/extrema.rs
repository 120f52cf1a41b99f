//! Rolling extrema: highest high / lowest low over a lookback window.
//!
//! ROLLING_HIGH(n)[i] = max(high[i-n+1..=i])
//! ROLLING_LOW(n)[i]  = min(low[i-n+1..=i])
//! Warmup: first (n-1) bars are undefined, as is any window holding a
//! non-finite price.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{require_period, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_rolling_high(
    bars: &[OhlcvBar],
    period: usize,
) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::RollingHigh(period);
    require_period(&indicator_type, period)?;
    Ok(rolling_extreme(bars, period, indicator_type, |b| b.high, f64::max))
}

pub fn calculate_rolling_low(
    bars: &[OhlcvBar],
    period: usize,
) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::RollingLow(period);
    require_period(&indicator_type, period)?;
    Ok(rolling_extreme(bars, period, indicator_type, |b| b.low, f64::min))
}

fn rolling_extreme(
    bars: &[OhlcvBar],
    period: usize,
    indicator_type: IndicatorType,
    field: impl Fn(&OhlcvBar) -> f64,
    pick: fn(f64, f64) -> f64,
) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let value = if i + 1 >= period {
                bars[i + 1 - period..=i]
                    .iter()
                    .map(&field)
                    .try_fold(None, |acc: Option<f64>, v| {
                        if v.is_finite() {
                            Some(Some(acc.map_or(v, |a| pick(a, v))))
                        } else {
                            None
                        }
                    })
                    .flatten()
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
