//! Technical indicator implementations.
//!
//! Every indicator is a pure function of a bar slice and yields one
//! [`IndicatorPoint`] per input bar. Warmup bars and bars whose inputs
//! are unusable carry `value: None` rather than a sentinel number.

pub mod adx;
pub mod atr;
pub mod extrema;
pub mod sma;

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::error::IndicatorError;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    VolumeSma(usize),
    Atr(usize),
    Adx(usize),
    RollingHigh(usize),
    RollingLow(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(|p| p.value)
    }

    /// Value at the most recent bar, if defined.
    pub fn latest(&self) -> Option<f64> {
        self.values.last().and_then(|p| p.value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::RollingHigh(period) => write!(f, "ROLLING_HIGH({})", period),
            IndicatorType::RollingLow(period) => write!(f, "ROLLING_LOW({})", period),
        }
    }
}

pub(crate) fn require_period(indicator_type: &IndicatorType, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::ZeroPeriod {
            indicator: indicator_type.to_string(),
        });
    }
    Ok(())
}

/// Apply Wilder smoothing (alpha = 1/period) to a series.
///
/// The seed is the mean of the first `period` consecutive defined values;
/// an undefined value after the seed makes the rest of the output undefined.
pub(crate) fn wilder_smooth(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    let mut run = 0usize;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_some() {
            run += 1;
            if run == period {
                seed_end = Some(i + 1);
                break;
            }
        } else {
            run = 0;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed: f64 = values[seed_end - period..seed_end]
        .iter()
        .map(|v| v.unwrap_or(0.0))
        .sum::<f64>()
        / period as f64;
    result[seed_end - 1] = Some(seed);

    let mut prev = seed;
    for i in seed_end..n {
        match values[i] {
            Some(v) => {
                prev = (prev * (period - 1) as f64 + v) / period as f64;
                result[i] = Some(prev);
            }
            None => break,
        }
    }
    result
}
