//! The agent loop: per symbol, fetch bars, classify the regime, pick an
//! adjustment, generate a signal, manage the open position and size a new
//! one under the risk manager's limits.
//!
//! The orchestrator is the single owner of the [`RiskManager`]. Every
//! collaborator failure is converted to a neutral value here so a bad
//! symbol never aborts the cycle; only the daily loss limit halts trading.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::activity_log::ActivityLog;
use crate::domain::adjustment::{AdjustmentAdvisor, StrategyAdjustment};
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::position::{OpenPosition, PositionIntent, PositionSide};
use crate::domain::regime::{MarketConditions, RegimeClassifier};
use crate::domain::risk::RiskManager;
use crate::domain::signal::{Signal, SignalGenerator};
use crate::ports::execution_port::{ExecutionPort, OrderModification, OrderRequest, OrderSide};
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMethod {
    Percent,
    Atr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub lookback_days: i64,
    pub poll_interval_secs: u64,
    pub risk_reward_ratio: f64,
    pub stop_method: StopMethod,
    pub stop_loss_pct: f64,
    pub asset_multiplier: f64,
    /// Zero disables the time-based exit.
    pub max_holding_minutes: i64,
    pub trailing_stops: bool,
    /// Skip new entries while the adjustment says hold.
    pub respect_regime_hold: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            symbols: Vec::new(),
            timeframe: "1D".into(),
            lookback_days: 120,
            poll_interval_secs: 60,
            risk_reward_ratio: 2.0,
            stop_method: StopMethod::Percent,
            stop_loss_pct: 0.02,
            asset_multiplier: 1.0,
            max_holding_minutes: 0,
            trailing_stops: true,
            respect_regime_hold: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Stopped,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// The run flag was cleared mid-cycle.
    Stopped,
    /// A directional signal arrived after the daily loss limit was hit.
    DailyLimitReached,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDecision {
    pub symbol: String,
    pub conditions: MarketConditions,
    pub adjustment: StrategyAdjustment,
    pub signal: Signal,
    pub intent: Option<PositionIntent>,
    pub order_id: Option<String>,
    pub note: String,
}

impl SymbolDecision {
    fn hold(symbol: &str, note: impl Into<String>) -> Self {
        SymbolDecision {
            symbol: symbol.to_string(),
            conditions: MarketConditions::unknown(),
            adjustment: StrategyAdjustment::HOLD,
            signal: Signal::Hold,
            intent: None,
            order_id: None,
            note: note.into(),
        }
    }
}

/// Everything a dashboard needs after a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSnapshot {
    pub cycle: u64,
    pub as_of: Option<NaiveDateTime>,
    pub status: AgentStatus,
    pub account_balance: f64,
    pub daily_loss_incurred: f64,
    pub daily_limit_ok: bool,
    pub remaining_daily_risk: f64,
    /// Cash balance as the gateway reports it; `None` when unavailable.
    pub broker_balance: Option<f64>,
    pub decisions: Vec<SymbolDecision>,
    pub open_positions: Vec<OpenPosition>,
    pub position_values: Vec<PositionValue>,
}

/// An open position marked at the last price seen for its symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionValue {
    pub symbol: String,
    pub price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
}

/// Start of the fetch window, or `None` when it falls outside the
/// representable date range.
pub fn lookback_start(as_of: NaiveDateTime, lookback_days: i64) -> Option<NaiveDateTime> {
    as_of.checked_sub_signed(Duration::try_days(lookback_days)?)
}

/// Size a bracket trade for `side` at `entry_price` under the regime
/// adjustment. `None` when no stop, no target or no quantity can be derived.
pub fn plan_intent(
    risk: &RiskManager,
    config: &OrchestratorConfig,
    adjustment: &StrategyAdjustment,
    side: PositionSide,
    entry_price: f64,
    atr: Option<f64>,
) -> Option<PositionIntent> {
    let stop_loss_price = match config.stop_method {
        StopMethod::Percent => {
            let pct = config.stop_loss_pct * adjustment.stop_loss_multiplier;
            risk.derive_stop_for_side(entry_price, side, Some(pct), None)?
        }
        StopMethod::Atr => {
            let volatility = atr? * adjustment.stop_loss_multiplier;
            risk.derive_stop_for_side(entry_price, side, None, Some(volatility))?
        }
    };

    let quantity = risk.size_position(entry_price, stop_loss_price, config.asset_multiplier)
        * adjustment.risk_per_trade_multiplier;
    if !(quantity > 0.0 && quantity.is_finite()) {
        return None;
    }

    let ratio = config.risk_reward_ratio * adjustment.take_profit_multiplier;
    let take_profit_price = risk.derive_take_profit(entry_price, stop_loss_price, ratio)?;

    Some(PositionIntent {
        side,
        entry_price,
        stop_loss_price,
        take_profit_price,
        quantity,
    })
}

pub struct DecisionOrchestrator {
    config: OrchestratorConfig,
    risk: RiskManager,
    classifier: RegimeClassifier,
    advisor: AdjustmentAdvisor,
    generator: SignalGenerator,
    market_data: Box<dyn MarketDataPort>,
    broker: Box<dyn ExecutionPort>,
    positions: BTreeMap<String, OpenPosition>,
    marks: BTreeMap<String, f64>,
    activity: ActivityLog,
    snapshot: ControlSnapshot,
    status: AgentStatus,
    cycle: u64,
    last_day: Option<NaiveDate>,
}

impl DecisionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        risk: RiskManager,
        classifier: RegimeClassifier,
        generator: SignalGenerator,
        market_data: Box<dyn MarketDataPort>,
        broker: Box<dyn ExecutionPort>,
    ) -> Self {
        let state = risk.state();
        let snapshot = ControlSnapshot {
            cycle: 0,
            as_of: None,
            status: AgentStatus::Idle,
            account_balance: state.account_balance,
            daily_loss_incurred: state.daily_loss_incurred,
            daily_limit_ok: state.daily_loss_incurred < risk.daily_loss_limit(),
            remaining_daily_risk: risk.remaining_daily_risk(),
            broker_balance: None,
            decisions: Vec::new(),
            open_positions: Vec::new(),
            position_values: Vec::new(),
        };
        DecisionOrchestrator {
            config,
            risk,
            classifier,
            advisor: AdjustmentAdvisor::new(),
            generator,
            market_data,
            broker,
            positions: BTreeMap::new(),
            marks: BTreeMap::new(),
            activity: ActivityLog::default(),
            snapshot,
            status: AgentStatus::Idle,
            cycle: 0,
            last_day: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn snapshot(&self) -> &ControlSnapshot {
        &self.snapshot
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn position(&self, symbol: &str) -> Option<&OpenPosition> {
        self.positions.get(symbol)
    }

    fn log(&mut self, at: NaiveDateTime, message: String) {
        info!("{message}");
        self.activity.push(at, message);
    }

    /// One pass over every configured symbol at `as_of`.
    pub fn run_cycle(&mut self, as_of: NaiveDateTime, running: &AtomicBool) -> CycleOutcome {
        self.cycle += 1;
        self.status = AgentStatus::Running;

        let today = as_of.date();
        match self.last_day {
            Some(previous) if previous != today => {
                self.risk.roll_over_day();
                self.log(as_of, format!("New trading day {today}, daily loss reset."));
            }
            _ => {}
        }
        self.last_day = Some(today);

        let mut decisions = Vec::with_capacity(self.config.symbols.len());
        let mut outcome = CycleOutcome::Completed;
        let symbols = self.config.symbols.clone();

        for symbol in &symbols {
            if !running.load(Ordering::SeqCst) {
                self.status = AgentStatus::Stopped;
                outcome = CycleOutcome::Stopped;
                break;
            }
            let (decision, halted) = self.process_symbol(symbol, as_of);
            decisions.push(decision);
            if halted {
                self.status = AgentStatus::Halted;
                outcome = CycleOutcome::DailyLimitReached;
                break;
            }
        }

        self.publish(as_of, decisions);
        outcome
    }

    fn process_symbol(&mut self, symbol: &str, as_of: NaiveDateTime) -> (SymbolDecision, bool) {
        self.log(as_of, format!("--- Processing symbol: {symbol} ---"));

        let Some(start) = lookback_start(as_of, self.config.lookback_days) else {
            warn!(symbol, lookback_days = self.config.lookback_days, "lookback window out of range");
            return (SymbolDecision::hold(symbol, "lookback out of range"), false);
        };
        let bars = match self
            .market_data
            .fetch_historical(symbol, &self.config.timeframe, start, as_of)
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol, error = %e, "market data fetch failed");
                Vec::new()
            }
        };
        if bars.is_empty() {
            self.log(as_of, format!("Could not fetch historical data for {symbol}."));
            return (SymbolDecision::hold(symbol, "no data"), false);
        }
        self.log(as_of, format!("Fetched {} data points for {symbol}.", bars.len()));

        let conditions = self.classifier.classify(&bars);
        let adjustment = self.advisor.suggest(&conditions);
        let signal = self.generator.generate(&bars);
        self.log(
            as_of,
            format!("Signal for {symbol}: {signal} (regime {})", conditions.regime),
        );

        let mut decision = SymbolDecision {
            symbol: symbol.to_string(),
            conditions,
            adjustment,
            signal,
            intent: None,
            order_id: None,
            note: String::new(),
        };

        let latest_close = bars.last().map(|b| b.close).filter(|c| c.is_finite());
        if let Some(close) = latest_close {
            if let Err(e) = self.broker.mark_price(symbol, close) {
                debug!(symbol, error = %e, "gateway rejected mark price");
            }
        }

        if self.positions.contains_key(symbol) {
            decision.note = match self.reconcile_position(symbol, as_of) {
                Some(note) => note,
                None => self.manage_position(symbol, as_of, latest_close),
            };
        }

        if !signal.is_directional() {
            if decision.note.is_empty() {
                decision.note = "hold".into();
            }
            return (decision, false);
        }
        if self.positions.contains_key(symbol) {
            decision.note = "position already open".into();
            return (decision, false);
        }
        if self.config.respect_regime_hold && adjustment.is_hold() {
            self.log(
                as_of,
                format!("Regime {} suggests holding, skipping {signal} for {symbol}.", conditions.regime),
            );
            decision.note = "regime suggests hold".into();
            return (decision, false);
        }
        if !self.risk.daily_limit_ok() {
            self.log(as_of, "Daily risk limit reached. Halting trades for the day.".into());
            decision.note = "daily risk limit reached".into();
            return (decision, true);
        }

        let Some(side) = PositionSide::from_signal(signal) else {
            return (decision, false);
        };
        let Some(entry_price) = latest_close else {
            decision.note = "latest close undefined".into();
            return (decision, false);
        };
        let atr = self.latest_atr(&bars);

        let Some(intent) = plan_intent(
            &self.risk,
            &self.config,
            &adjustment,
            side,
            entry_price,
            atr,
        ) else {
            self.log(as_of, format!("No valid trade could be sized for {symbol}."));
            decision.note = "no valid stop, target or size".into();
            return (decision, false);
        };

        self.log(
            as_of,
            format!(
                "Executing {signal} for {:.2} units of {symbol} at {:.2}, SL: {:.2}, TP: {:.2}",
                intent.quantity, intent.entry_price, intent.stop_loss_price, intent.take_profit_price
            ),
        );
        let request = OrderRequest::market(symbol, OrderSide::opening(side), intent.quantity, entry_price)
            .with_bracket(intent.stop_loss_price, intent.take_profit_price);
        match self.broker.place_order(&request) {
            Ok(order_id) => {
                self.positions.insert(
                    symbol.to_string(),
                    OpenPosition::from_intent(symbol, &intent, as_of, order_id.clone()),
                );
                self.marks.insert(symbol.to_string(), entry_price);
                decision.order_id = Some(order_id);
                decision.note = "order placed".into();
            }
            Err(e) => {
                self.log(as_of, format!("Order for {symbol} failed: {e}"));
                decision.note = "order rejected".into();
            }
        }
        decision.intent = Some(intent);
        (decision, false)
    }

    fn latest_atr(&self, bars: &[OhlcvBar]) -> Option<f64> {
        calculate_atr(bars, self.classifier.config().atr_period)
            .ok()
            .and_then(|series| series.latest())
    }

    fn current_price(&self, symbol: &str, latest_close: Option<f64>) -> Option<f64> {
        match self.broker.get_current_price(symbol) {
            Ok(price) if price > 0.0 && price.is_finite() => Some(price),
            Ok(_) => latest_close,
            Err(e) => {
                debug!(symbol, error = %e, "gateway price unavailable, using latest close");
                latest_close
            }
        }
    }

    /// Drop a tracked position the gateway no longer holds, e.g. after a
    /// bracket leg filled on its side. A failed query changes nothing.
    fn reconcile_position(&mut self, symbol: &str, as_of: NaiveDateTime) -> Option<String> {
        let held = match self.broker.get_open_positions() {
            Ok(positions) => positions,
            Err(e) => {
                debug!(symbol, error = %e, "open positions unavailable, keeping local view");
                return None;
            }
        };
        let side = self.positions.get(symbol)?.side;
        let still_open = held.iter().any(|p| {
            p.symbol == symbol && p.quantity != 0.0 && (p.quantity > 0.0) == side.is_long()
        });
        if still_open {
            return None;
        }

        self.positions.remove(symbol);
        self.marks.remove(symbol);
        self.log(
            as_of,
            format!("Position for {symbol} is no longer held by the gateway, dropping it."),
        );
        Some("closed by gateway".into())
    }

    /// Trail the stop and close on stop, target or holding time. Returns a
    /// note for the decision record.
    fn manage_position(
        &mut self,
        symbol: &str,
        as_of: NaiveDateTime,
        latest_close: Option<f64>,
    ) -> String {
        let Some(price) = self.current_price(symbol, latest_close) else {
            return "position open, no price".into();
        };
        self.marks.insert(symbol.to_string(), price);
        let Some(mut position) = self.positions.get(symbol).cloned() else {
            return String::new();
        };

        if self.config.trailing_stops {
            let trailed = self
                .risk
                .update_trailing_stop(price, position.stop_loss, position.is_long());
            if trailed != position.stop_loss {
                position.stop_loss = trailed;
                let modification = OrderModification {
                    stop_loss: Some(trailed),
                    ..OrderModification::default()
                };
                match self.broker.modify_order(&position.order_id, &modification) {
                    Ok(true) => {}
                    Ok(false) => warn!(symbol, order_id = %position.order_id, "gateway refused stop update"),
                    Err(e) => warn!(symbol, error = %e, "stop update failed"),
                }
                self.log(as_of, format!("Trailing stop for {symbol} moved to {trailed:.2}."));
            }
        }

        let held_too_long = self.config.max_holding_minutes > 0
            && Duration::try_minutes(self.config.max_holding_minutes)
                .is_some_and(|limit| as_of.signed_duration_since(position.opened_at) > limit);
        let reason = if position.stop_hit(price) {
            Some("stop loss hit")
        } else if position.target_hit(price) {
            Some("take profit hit")
        } else if held_too_long {
            Some("time-based exit")
        } else {
            None
        };

        let Some(reason) = reason else {
            self.positions.insert(symbol.to_string(), position);
            return "position open".into();
        };

        self.log(as_of, format!("Closing position for {symbol} due to {reason}."));
        match self.broker.cancel_order(&position.order_id) {
            Ok(_) => {}
            Err(e) => debug!(symbol, error = %e, "bracket cancel failed"),
        }
        let close = OrderRequest::market(
            symbol,
            OrderSide::closing(position.side),
            position.quantity,
            price,
        );
        if let Err(e) = self.broker.place_order(&close) {
            self.log(as_of, format!("Close order for {symbol} failed: {e}"));
            self.positions.insert(symbol.to_string(), position);
            return "close order failed".into();
        }

        let pnl = position.unrealized_pnl(price);
        if pnl < 0.0 {
            self.risk.record_loss(-pnl);
            self.log(as_of, format!("Realized loss of {:.2} on {symbol}.", -pnl));
        } else {
            self.log(as_of, format!("Realized gain of {pnl:.2} on {symbol}."));
        }
        self.positions.remove(symbol);
        self.marks.remove(symbol);
        format!("closed: {reason}")
    }

    fn publish(&mut self, as_of: NaiveDateTime, decisions: Vec<SymbolDecision>) {
        let state = self.risk.state();
        self.snapshot = ControlSnapshot {
            cycle: self.cycle,
            as_of: Some(as_of),
            status: self.status,
            account_balance: state.account_balance,
            daily_loss_incurred: state.daily_loss_incurred,
            daily_limit_ok: state.daily_loss_incurred < self.risk.daily_loss_limit(),
            remaining_daily_risk: self.risk.remaining_daily_risk(),
            broker_balance: self.broker.get_balance().ok(),
            decisions,
            open_positions: self.positions.values().cloned().collect(),
            position_values: self
                .positions
                .values()
                .filter_map(|p| {
                    let price = *self.marks.get(&p.symbol)?;
                    Some(PositionValue {
                        symbol: p.symbol.clone(),
                        price,
                        market_value: p.market_value(price),
                        unrealized_pnl: p.unrealized_pnl(price),
                    })
                })
                .collect(),
        };
    }

    /// Repeat cycles until `running` is cleared, `max_cycles` have run, or
    /// the daily loss limit halts trading. `on_cycle` sees each snapshot.
    pub fn run<C, O>(
        &mut self,
        running: &AtomicBool,
        max_cycles: Option<u64>,
        mut clock: C,
        mut on_cycle: O,
    ) -> CycleOutcome
    where
        C: FnMut() -> NaiveDateTime,
        O: FnMut(&ControlSnapshot),
    {
        self.log(clock(), "Trading loop started.".into());
        let mut outcome = CycleOutcome::Stopped;
        let mut completed = 0u64;

        while running.load(Ordering::SeqCst) {
            outcome = self.run_cycle(clock(), running);
            completed += 1;
            on_cycle(&self.snapshot);

            if outcome != CycleOutcome::Completed {
                break;
            }
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }

            self.log(clock(), "Loop finished. Waiting for next iteration...".into());
            for _ in 0..self.config.poll_interval_secs {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                thread::sleep(StdDuration::from_secs(1));
            }
        }

        if outcome == CycleOutcome::Completed && !running.load(Ordering::SeqCst) {
            outcome = CycleOutcome::Stopped;
        }
        if outcome == CycleOutcome::Stopped {
            self.status = AgentStatus::Stopped;
            self.snapshot.status = AgentStatus::Stopped;
        }
        self.log(clock(), "Trading loop has been terminated.".into());
        outcome
    }
}
