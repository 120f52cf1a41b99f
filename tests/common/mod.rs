#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regimetrader::domain::error::TraderError;
pub use regimetrader::domain::ohlcv::OhlcvBar;
use regimetrader::ports::execution_port::{
    BrokerPosition, ExecutionPort, OrderId, OrderModification, OrderRequest, OrderSide,
};
use regimetrader::ports::market_data_port::MarketDataPort;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Market data keyed by symbol. Clones share state, so a test can swap
/// bars after the orchestrator has taken ownership of its copy.
#[derive(Clone, Default)]
pub struct MockMarketData {
    data: Arc<Mutex<HashMap<String, Vec<OhlcvBar>>>>,
    errors: Arc<Mutex<HashMap<String, String>>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.set_bars(symbol, bars);
        self
    }

    pub fn with_error(self, symbol: &str, reason: &str) -> Self {
        self.errors
            .lock()
            .unwrap()
            .insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<OhlcvBar>) {
        self.data.lock().unwrap().insert(symbol.to_string(), bars);
    }
}

impl MarketDataPort for MockMarketData {
    fn fetch_historical(
        &self,
        symbol: &str,
        _timeframe: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> Result<Vec<OhlcvBar>, TraderError> {
        if let Some(reason) = self.errors.lock().unwrap().get(symbol) {
            return Err(TraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct BrokerLog {
    pub placed: Vec<OrderRequest>,
    pub modified: Vec<(String, OrderModification)>,
    pub cancelled: Vec<String>,
    pub prices: HashMap<String, f64>,
    /// Signed net quantity per symbol from placed orders.
    pub positions: HashMap<String, f64>,
    pub reject_orders: bool,
    pub positions_unavailable: bool,
}

/// Broker that records every call and nets placed orders into positions.
/// Clones share the log.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    pub log: Arc<Mutex<BrokerLog>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.log
            .lock()
            .unwrap()
            .prices
            .insert(symbol.to_string(), price);
    }

    pub fn reject_orders(&self) {
        self.log.lock().unwrap().reject_orders = true;
    }

    /// Simulate a gateway-side exit, e.g. a bracket leg filling.
    pub fn drop_position(&self, symbol: &str) {
        self.log.lock().unwrap().positions.remove(symbol);
    }

    pub fn fail_position_queries(&self) {
        self.log.lock().unwrap().positions_unavailable = true;
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.log.lock().unwrap().placed.clone()
    }

    pub fn modified(&self) -> Vec<(String, OrderModification)> {
        self.log.lock().unwrap().modified.clone()
    }
}

impl ExecutionPort for RecordingExecutor {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderId, TraderError> {
        let mut log = self.log.lock().unwrap();
        if log.reject_orders {
            return Err(TraderError::Execution {
                reason: "rejected".into(),
            });
        }
        let signed = match request.side {
            OrderSide::Buy => request.quantity,
            OrderSide::Sell => -request.quantity,
        };
        let net = log.positions.entry(request.symbol.clone()).or_insert(0.0);
        *net += signed;
        if net.abs() < 1e-9 {
            log.positions.remove(&request.symbol);
        }
        log.placed.push(request.clone());
        Ok(format!("rec-{}", log.placed.len()))
    }

    fn modify_order(
        &self,
        order_id: &str,
        modification: &OrderModification,
    ) -> Result<bool, TraderError> {
        self.log
            .lock()
            .unwrap()
            .modified
            .push((order_id.to_string(), modification.clone()));
        Ok(true)
    }

    fn cancel_order(&self, order_id: &str) -> Result<bool, TraderError> {
        self.log
            .lock()
            .unwrap()
            .cancelled
            .push(order_id.to_string());
        Ok(true)
    }

    fn get_balance(&self) -> Result<f64, TraderError> {
        Ok(0.0)
    }

    fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, TraderError> {
        let log = self.log.lock().unwrap();
        if log.positions_unavailable {
            return Err(TraderError::Execution {
                reason: "positions unavailable".into(),
            });
        }
        Ok(log
            .positions
            .iter()
            .map(|(symbol, &quantity)| BrokerPosition {
                symbol: symbol.clone(),
                quantity,
                average_price: 0.0,
            })
            .collect())
    }

    fn get_current_price(&self, symbol: &str) -> Result<f64, TraderError> {
        self.log
            .lock()
            .unwrap()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| TraderError::Execution {
                reason: "no price".into(),
            })
    }
}

pub fn ts(date: &str, time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Daily bars from closes, high/low `half_range` either side.
pub fn bars_from_closes(closes: &[f64], half_range: f64, volume: f64) -> Vec<OhlcvBar> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            timestamp: base + Duration::days(i as i64),
            open: close,
            high: close + half_range,
            low: close - half_range,
            close,
            volume,
        })
        .collect()
}

/// 70 rising bars whose last bar spikes down to a fresh 20-bar low:
/// short SMA above long, close above long SMA, swing low. Generates BUY.
pub fn buy_setup() -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..70).map(|i| 100.0 + i as f64).collect();
    let mut bars = bars_from_closes(&closes, 0.5, 1000.0);
    let last = bars.len() - 1;
    bars[last].low = 50.0;
    bars
}

/// Mirror of [`buy_setup`]: falling bars, last bar spikes to a 20-bar high.
pub fn sell_setup() -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..70).map(|i| 200.0 - i as f64).collect();
    let mut bars = bars_from_closes(&closes, 0.5, 1000.0);
    let last = bars.len() - 1;
    bars[last].high = 300.0;
    bars
}

/// Flat series; generates HOLD.
pub fn flat_setup(price: f64) -> Vec<OhlcvBar> {
    bars_from_closes(&vec![price; 70], 0.5, 1000.0)
}

pub fn last_close(bars: &[OhlcvBar]) -> f64 {
    bars.last().unwrap().close
}
