//! Decision pipeline tests: the orchestrator driven through mock ports,
//! plus the documented end-to-end scenarios.

mod common;

use approx::assert_relative_eq;
use common::*;
use regimetrader::adapters::paper_executor::PaperExecutor;
use regimetrader::domain::adjustment::{AdjustmentAdvisor, StrategyType};
use regimetrader::domain::orchestrator::{
    AgentStatus, CycleOutcome, DecisionOrchestrator, OrchestratorConfig,
};
use regimetrader::domain::position::PositionSide;
use regimetrader::domain::regime::{MarketConditions, Regime, RegimeClassifier, Trend, Volatility};
use regimetrader::domain::risk::RiskManager;
use regimetrader::domain::signal::{Signal, SignalGenerator};
use regimetrader::ports::execution_port::{ExecutionPort, OrderSide};
use std::sync::atomic::AtomicBool;

fn risk() -> RiskManager {
    RiskManager::new(10_000.0, 0.01, 0.05).unwrap()
}

fn build(
    symbols: &[&str],
    data: &MockMarketData,
    broker: &RecordingExecutor,
    risk: RiskManager,
    tweak: impl FnOnce(&mut OrchestratorConfig),
) -> DecisionOrchestrator {
    build_with_broker(symbols, data, Box::new(broker.clone()), risk, tweak)
}

fn build_with_broker(
    symbols: &[&str],
    data: &MockMarketData,
    broker: Box<dyn ExecutionPort>,
    risk: RiskManager,
    tweak: impl FnOnce(&mut OrchestratorConfig),
) -> DecisionOrchestrator {
    let mut config = OrchestratorConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        poll_interval_secs: 0,
        ..OrchestratorConfig::default()
    };
    tweak(&mut config);
    DecisionOrchestrator::new(
        config,
        risk,
        RegimeClassifier::default(),
        SignalGenerator::default(),
        Box::new(data.clone()),
        broker,
    )
}

fn go() -> AtomicBool {
    AtomicBool::new(true)
}

mod entries {
    use super::*;

    #[test]
    fn buy_signal_places_sized_bracket_order() {
        let bars = buy_setup();
        let entry = last_close(&bars);
        let data = MockMarketData::new().with_bars("AAPL", bars);
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});

        let outcome = orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());
        assert_eq!(outcome, CycleOutcome::Completed);

        let decision = &orch.snapshot().decisions[0];
        assert_eq!(decision.signal, Signal::Buy);
        assert_ne!(decision.adjustment.strategy_type, StrategyType::Hold);
        assert_eq!(decision.order_id.as_deref(), Some("rec-1"));

        let intent = decision.intent.clone().unwrap();
        let pct = 0.02 * decision.adjustment.stop_loss_multiplier;
        assert_relative_eq!(intent.stop_loss_price, entry * (1.0 - pct), epsilon = 1e-9);
        let expected_qty =
            100.0 / (entry - intent.stop_loss_price) * decision.adjustment.risk_per_trade_multiplier;
        assert_relative_eq!(intent.quantity, expected_qty, epsilon = 1e-9);
        let ratio = 2.0 * decision.adjustment.take_profit_multiplier;
        assert_relative_eq!(
            intent.take_profit_price,
            entry + (entry - intent.stop_loss_price) * ratio,
            epsilon = 1e-9
        );

        let placed = broker.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, OrderSide::Buy);
        assert_eq!(placed[0].stop_loss, Some(intent.stop_loss_price));
        assert_eq!(placed[0].take_profit, Some(intent.take_profit_price));
        assert_eq!(placed[0].reference_price, Some(entry));

        let position = orch.position("AAPL").unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(orch.snapshot().open_positions.len(), 1);
    }

    #[test]
    fn sell_signal_opens_short_with_stop_above_entry() {
        let bars = sell_setup();
        let entry = last_close(&bars);
        let data = MockMarketData::new().with_bars("MSFT", bars);
        let broker = RecordingExecutor::new();
        let mut orch = build(&["MSFT"], &data, &broker, risk(), |_| {});

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        let intent = orch.snapshot().decisions[0].intent.clone().unwrap();
        assert_eq!(intent.side, PositionSide::Short);
        assert!(intent.stop_loss_price > entry);
        assert!(intent.take_profit_price < entry);
        assert_eq!(broker.placed()[0].side, OrderSide::Sell);
    }

    #[test]
    fn atr_stop_method_places_order() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |c| {
            c.stop_method = regimetrader::domain::orchestrator::StopMethod::Atr;
        });

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        let intent = orch.snapshot().decisions[0].intent.clone().unwrap();
        assert!(intent.stop_loss_price < intent.entry_price);
        assert_eq!(broker.placed().len(), 1);
    }

    #[test]
    fn open_position_blocks_second_entry() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());
        orch.run_cycle(ts("2024-03-11", "16:01:00"), &go());

        assert_eq!(broker.placed().len(), 1);
        assert_eq!(orch.snapshot().decisions[0].note, "position already open");
    }

    #[test]
    fn rejected_order_leaves_no_position() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        broker.reject_orders();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        assert_eq!(orch.snapshot().decisions[0].note, "order rejected");
        assert!(orch.position("AAPL").is_none());
    }

    #[test]
    fn uncertain_regime_skips_entry_when_hold_is_respected() {
        let mut bars = buy_setup();
        bars[5].high = f64::NAN;
        let data = MockMarketData::new().with_bars("AAPL", bars);
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        let decision = &orch.snapshot().decisions[0];
        assert_eq!(decision.conditions.regime, Regime::Unknown);
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.note, "regime suggests hold");
        assert!(broker.placed().is_empty());
    }

    #[test]
    fn hold_adjustment_halves_size_when_not_respected() {
        let mut bars = buy_setup();
        bars[5].high = f64::NAN;
        let entry = last_close(&bars);
        let data = MockMarketData::new().with_bars("AAPL", bars);
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |c| {
            c.respect_regime_hold = false;
        });

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        let intent = orch.snapshot().decisions[0].intent.clone().unwrap();
        assert_relative_eq!(intent.stop_loss_price, entry * 0.98, epsilon = 1e-9);
        let full = 100.0 / (entry - entry * 0.98);
        assert_relative_eq!(intent.quantity, full * 0.5, epsilon = 1e-9);
    }
}

mod degradation {
    use super::*;

    #[test]
    fn failing_data_source_degrades_to_hold_and_continues() {
        let data = MockMarketData::new()
            .with_error("BAD", "connection refused")
            .with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["BAD", "AAPL"], &data, &broker, risk(), |_| {});

        let outcome = orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        assert_eq!(outcome, CycleOutcome::Completed);
        let decisions = &orch.snapshot().decisions;
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].signal, Signal::Hold);
        assert_eq!(decisions[0].conditions, MarketConditions::unknown());
        assert_eq!(decisions[0].note, "no data");
        assert_eq!(decisions[1].note, "order placed");
    }

    #[test]
    fn flat_market_is_hold() {
        let data = MockMarketData::new().with_bars("AAPL", flat_setup(150.0));
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        assert_eq!(orch.snapshot().decisions[0].signal, Signal::Hold);
        assert!(broker.placed().is_empty());
    }

    #[test]
    fn cleared_flag_stops_cycle() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});

        let outcome = orch.run_cycle(ts("2024-03-11", "16:00:00"), &AtomicBool::new(false));

        assert_eq!(outcome, CycleOutcome::Stopped);
        assert_eq!(orch.status(), AgentStatus::Stopped);
        assert!(broker.placed().is_empty());
    }
}

mod daily_limit {
    use super::*;

    fn exhausted_risk() -> RiskManager {
        let mut risk = risk();
        risk.record_loss(500.0);
        risk
    }

    #[test]
    fn directional_signal_after_limit_halts() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL", "MSFT"], &data, &broker, exhausted_risk(), |_| {});

        let outcome = orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());

        assert_eq!(outcome, CycleOutcome::DailyLimitReached);
        assert_eq!(orch.status(), AgentStatus::Halted);
        assert_eq!(orch.snapshot().status, AgentStatus::Halted);
        assert!(!orch.snapshot().daily_limit_ok);
        // MSFT is never reached
        assert_eq!(orch.snapshot().decisions.len(), 1);
        assert!(broker.placed().is_empty());
    }

    #[test]
    fn run_stops_at_limit() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, exhausted_risk(), |_| {});

        let mut cycles = 0;
        let outcome = orch.run(
            &go(),
            Some(5),
            || ts("2024-03-11", "16:00:00"),
            |_| cycles += 1,
        );

        assert_eq!(outcome, CycleOutcome::DailyLimitReached);
        assert_eq!(cycles, 1);
    }

    #[test]
    fn hold_signal_does_not_halt() {
        let data = MockMarketData::new().with_bars("AAPL", flat_setup(100.0));
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, exhausted_risk(), |_| {});

        let outcome = orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());
        assert_eq!(outcome, CycleOutcome::Completed);
    }

    #[test]
    fn new_day_rolls_over_and_trading_resumes() {
        let data = MockMarketData::new().with_bars("AAPL", flat_setup(100.0));
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, exhausted_risk(), |_| {});

        orch.run_cycle(ts("2024-03-11", "16:00:00"), &go());
        assert_eq!(orch.risk().daily_loss_incurred(), 500.0);

        data.set_bars("AAPL", buy_setup());
        let outcome = orch.run_cycle(ts("2024-03-12", "09:30:00"), &go());

        assert_eq!(outcome, CycleOutcome::Completed);
        assert_eq!(orch.risk().daily_loss_incurred(), 0.0);
        assert_eq!(orch.risk().initial_daily_balance(), 9_500.0);
        assert_eq!(broker.placed().len(), 1);
    }
}

mod position_management {
    use super::*;

    fn opened() -> (MockMarketData, RecordingExecutor, DecisionOrchestrator) {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |c| {
            c.max_holding_minutes = 60;
        });
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());
        assert!(orch.position("AAPL").is_some());
        (data, broker, orch)
    }

    #[test]
    fn stop_hit_closes_and_records_loss() {
        let (data, broker, mut orch) = opened();
        let position = orch.position("AAPL").unwrap().clone();
        data.set_bars("AAPL", flat_setup(150.0));
        broker.set_price("AAPL", 150.0);

        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        assert!(orch.position("AAPL").is_none());
        assert_eq!(orch.snapshot().decisions[0].note, "closed: stop loss hit");
        let expected_loss = position.quantity * (position.entry_price - 150.0);
        assert_relative_eq!(orch.risk().daily_loss_incurred(), expected_loss, epsilon = 1e-6);
        assert_relative_eq!(
            orch.risk().account_balance(),
            10_000.0 - expected_loss,
            epsilon = 1e-6
        );

        let placed = broker.placed();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[1].side, OrderSide::Sell);
        assert_relative_eq!(placed[1].quantity, position.quantity);
        assert_eq!(broker.log.lock().unwrap().cancelled, vec![position.order_id]);
    }

    #[test]
    fn target_hit_closes_without_recording_loss() {
        let (data, broker, mut orch) = opened();
        data.set_bars("AAPL", flat_setup(250.0));
        broker.set_price("AAPL", 250.0);

        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        assert!(orch.position("AAPL").is_none());
        assert_eq!(orch.snapshot().decisions[0].note, "closed: take profit hit");
        assert_eq!(orch.risk().daily_loss_incurred(), 0.0);
        assert_eq!(orch.risk().account_balance(), 10_000.0);
        // the stop trailed up before the exit
        assert_eq!(broker.modified().len(), 1);
    }

    #[test]
    fn trailing_stop_ratchets_and_is_pushed_to_broker() {
        let (_data, broker, mut orch) = opened();
        broker.set_price("AAPL", 172.0);

        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        let position = orch.position("AAPL").unwrap();
        assert_relative_eq!(position.stop_loss, 172.0 * 0.98, epsilon = 1e-9);
        let modified = broker.modified();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].0, position.order_id);
        assert_eq!(modified[0].1.stop_loss, Some(position.stop_loss));

        // price falls back, stop stays put
        broker.set_price("AAPL", 170.0);
        orch.run_cycle(ts("2024-03-11", "10:06:00"), &go());
        assert_relative_eq!(
            orch.position("AAPL").unwrap().stop_loss,
            172.0 * 0.98,
            epsilon = 1e-9
        );
        assert_eq!(broker.modified().len(), 1);
    }

    #[test]
    fn trailing_can_be_disabled() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |c| {
            c.trailing_stops = false;
        });
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());
        broker.set_price("AAPL", 172.0);
        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());
        assert!(broker.modified().is_empty());
    }

    #[test]
    fn time_based_exit_closes_flat_position() {
        let (data, broker, mut orch) = opened();
        data.set_bars("AAPL", flat_setup(169.0));

        orch.run_cycle(ts("2024-03-11", "10:30:00"), &go());
        assert!(orch.position("AAPL").is_some());

        orch.run_cycle(ts("2024-03-11", "11:01:00"), &go());
        assert!(orch.position("AAPL").is_none());
        assert_eq!(orch.snapshot().decisions[0].note, "closed: time-based exit");
        assert_eq!(orch.risk().daily_loss_incurred(), 0.0);
        assert_eq!(broker.placed().len(), 2);
    }
}

mod gateway_sync {
    use super::*;

    #[test]
    fn paper_broker_stop_hit_on_new_bars_records_loss() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let mut orch = build_with_broker(
            &["AAPL"],
            &data,
            Box::new(PaperExecutor::new(10_000.0)),
            risk(),
            |_| {},
        );
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());
        let position = orch.position("AAPL").unwrap().clone();
        assert_eq!(position.entry_price, 169.0);

        data.set_bars("AAPL", flat_setup(100.0));
        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        assert!(orch.position("AAPL").is_none());
        assert_eq!(orch.snapshot().decisions[0].note, "closed: stop loss hit");
        let expected_loss = position.quantity * (169.0 - 100.0);
        assert_relative_eq!(orch.risk().daily_loss_incurred(), expected_loss, epsilon = 1e-6);
        assert_relative_eq!(
            orch.snapshot().broker_balance.unwrap(),
            10_000.0 - expected_loss,
            epsilon = 1e-6
        );
    }

    #[test]
    fn paper_broker_trails_to_latest_close() {
        let bars = buy_setup();
        let data = MockMarketData::new().with_bars("AAPL", bars.clone());
        let mut orch = build_with_broker(
            &["AAPL"],
            &data,
            Box::new(PaperExecutor::new(10_000.0)),
            risk(),
            |_| {},
        );
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());

        let mut higher = bars;
        let last = higher.len() - 1;
        higher[last].close = 175.0;
        data.set_bars("AAPL", higher);
        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        let position = orch.position("AAPL").unwrap();
        assert_relative_eq!(position.stop_loss, 175.0 * 0.98, epsilon = 1e-9);
    }

    #[test]
    fn position_closed_by_gateway_is_dropped() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());
        assert!(orch.position("AAPL").is_some());

        broker.drop_position("AAPL");
        data.set_bars("AAPL", flat_setup(169.0));
        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        assert!(orch.position("AAPL").is_none());
        assert_eq!(orch.snapshot().decisions[0].note, "closed by gateway");
        // no closing order of our own
        assert_eq!(broker.placed().len(), 1);
        assert!(orch.snapshot().open_positions.is_empty());
    }

    #[test]
    fn failed_position_query_keeps_local_view() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());

        broker.fail_position_queries();
        orch.run_cycle(ts("2024-03-11", "10:05:00"), &go());

        assert!(orch.position("AAPL").is_some());
        assert_eq!(orch.snapshot().decisions[0].note, "position already open");
    }

    #[test]
    fn snapshot_values_open_positions() {
        let data = MockMarketData::new().with_bars("AAPL", buy_setup());
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL"], &data, &broker, risk(), |_| {});
        orch.run_cycle(ts("2024-03-11", "10:00:00"), &go());

        let snapshot = orch.snapshot();
        assert_relative_eq!(snapshot.remaining_daily_risk, 500.0, epsilon = 1e-9);
        assert_eq!(snapshot.broker_balance, Some(0.0));
        let value = &snapshot.position_values[0];
        let position = orch.position("AAPL").unwrap();
        assert_eq!(value.symbol, "AAPL");
        assert_eq!(value.price, 169.0);
        assert_relative_eq!(value.market_value, position.quantity * 169.0, epsilon = 1e-9);
        assert_eq!(value.unrealized_pnl, 0.0);
    }
}

mod activity {
    use super::*;

    #[test]
    fn log_is_bounded_and_newest_first() {
        let data = MockMarketData::new()
            .with_bars("AAPL", flat_setup(100.0))
            .with_error("MSFT", "down");
        let broker = RecordingExecutor::new();
        let mut orch = build(&["AAPL", "MSFT"], &data, &broker, risk(), |_| {});

        let outcome = orch.run(&go(), Some(40), || ts("2024-03-11", "16:00:00"), |_| {});

        assert_eq!(outcome, CycleOutcome::Completed);
        assert_eq!(orch.snapshot().cycle, 40);
        assert_eq!(orch.activity().len(), 100);
        assert_eq!(
            orch.activity().latest(),
            Some("[2024-03-11 16:00:00] Trading loop has been terminated.")
        );
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn sizing_one_percent_over_one_point() {
        assert_relative_eq!(risk().size_position(100.0, 99.0, 1.0), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn short_take_profit() {
        assert_relative_eq!(
            risk().derive_take_profit(100.0, 101.0, 2.0).unwrap(),
            98.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn trending_high_volatility_adjustment() {
        let conditions = MarketConditions::from_components(Volatility::High, Trend::Trending);
        assert_eq!(conditions.regime, Regime::TrendingHighVol);

        let adjustment = AdjustmentAdvisor::new().suggest(&conditions);
        assert_eq!(adjustment.strategy_type, StrategyType::TrendFollowing);
        assert_relative_eq!(adjustment.risk_per_trade_multiplier, 0.8, epsilon = 1e-9);
        assert_relative_eq!(adjustment.stop_loss_multiplier, 1.8, epsilon = 1e-9);
        assert_relative_eq!(adjustment.take_profit_multiplier, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_series_is_unknown_and_hold() {
        assert_eq!(RegimeClassifier::default().classify(&[]).regime, Regime::Unknown);
        assert_eq!(SignalGenerator::default().generate(&[]), Signal::Hold);
    }

    #[test]
    fn loss_exactly_at_limit_blocks() {
        let mut rm = risk();
        rm.record_loss(rm.initial_daily_balance() * 0.05);
        assert!(!rm.daily_limit_ok());
    }

    #[test]
    fn flat_series_is_hold() {
        let bars = bars_from_closes(&[42.0; 80], 0.0, 0.0);
        assert_eq!(SignalGenerator::default().generate(&bars), Signal::Hold);
    }
}
