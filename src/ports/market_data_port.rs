//! Market data port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDateTime;
use tracing::warn;

pub trait MarketDataPort {
    /// Bars for `symbol` at `timeframe` with timestamps in `[start, end]`,
    /// oldest first.
    fn fetch_historical(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<OhlcvBar>, TraderError>;

    /// Begin streaming updates for `symbol`. Sources without a live feed
    /// keep this default.
    fn start_realtime(&self, symbol: &str) -> Result<(), TraderError> {
        warn!(symbol, "real-time data not supported by this source");
        Err(TraderError::Data {
            reason: format!("real-time data not supported for {symbol}"),
        })
    }
}
