//! ADX: Average Directional Index (Wilder).
//!
//! Steps:
//! 1. +DM and -DM from consecutive bars
//! 2. Wilder-smooth +DM, -DM and TR (from the second bar on)
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR), -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! First defined value at index 2 * period - 1.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::atr::true_range;
use crate::domain::indicator::{
    require_period, wilder_smooth, IndicatorPoint, IndicatorSeries, IndicatorType,
};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_adx(bars: &[OhlcvBar], period: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Adx(period);
    require_period(&indicator_type, period)?;

    if let Some(index) = bars
        .iter()
        .position(|b| !(b.high.is_finite() && b.low.is_finite() && b.close.is_finite()))
    {
        return Err(IndicatorError::NonFiniteInput {
            indicator: indicator_type.to_string(),
            index,
        });
    }

    let n = bars.len();
    let mut plus_dm = vec![None; n];
    let mut minus_dm = vec![None; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let mut tr = true_range(bars);
    if let Some(first) = tr.first_mut() {
        // no directional movement exists for the first bar
        *first = None;
    }

    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let dx: Vec<Option<f64>> = (0..n)
        .map(|i| match (smooth_tr[i], smooth_plus[i], smooth_minus[i]) {
            (Some(tr), Some(plus), Some(minus)) if tr > 0.0 => {
                let plus_di = 100.0 * plus / tr;
                let minus_di = 100.0 * minus / tr;
                let di_sum = plus_di + minus_di;
                if di_sum == 0.0 {
                    Some(0.0)
                } else {
                    Some(100.0 * (plus_di - minus_di).abs() / di_sum)
                }
            }
            _ => None,
        })
        .collect();

    let values = bars
        .iter()
        .zip(wilder_smooth(&dx, period))
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
