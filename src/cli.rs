//! CLI definition and dispatch.

use chrono::{Local, NaiveDateTime};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::adapters::csv_adapter::parse_timestamp;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::{broker_from_config, market_data_from_config};
use crate::domain::adjustment::{AdjustmentAdvisor, StrategyAdjustment};
use crate::domain::config_validation::{
    self, parse_symbols, read_double, read_int, validate_config,
};
use crate::domain::error::TraderError;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::orchestrator::{
    lookback_start, plan_intent, ControlSnapshot, CycleOutcome, DecisionOrchestrator, OrchestratorConfig,
    StopMethod,
};
use crate::domain::position::{PositionIntent, PositionSide};
use crate::domain::regime::{MarketConditions, RegimeClassifier, RegimeConfig};
use crate::domain::risk::RiskManager;
use crate::domain::signal::{Signal, SignalConfig, SignalGenerator};
use crate::ports::config_port::ConfigPort;

/// Exit code when the daily loss limit halted trading.
pub const EXIT_DAILY_LIMIT: u8 = 6;

#[derive(Parser, Debug)]
#[command(name = "regimetrader", about = "Regime-aware trading decision agent")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the trading loop
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Evaluate every cycle at this timestamp instead of the wall clock
        #[arg(long)]
        as_of: Option<String>,
        /// Write the control snapshot as JSON after each cycle
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Classify the regime and signal for one symbol, print JSON
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Position size for a given balance, risk and stop distance
    Size {
        #[arg(long)]
        balance: f64,
        /// Fraction of the balance to risk, e.g. 0.01
        #[arg(long)]
        risk: f64,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        stop: f64,
        #[arg(long, default_value_t = 1.0)]
        multiplier: f64,
    },
    /// Validate an agent configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Install the global subscriber. Logs go to stderr so JSON on stdout stays clean.
/// Fails if a global subscriber is already set.
pub fn init_tracing(verbose: u8) -> Result<(), tracing_subscriber::util::TryInitError> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            cycles,
            as_of,
            snapshot,
        } => run_agent(&config, cycles, as_of.as_deref(), snapshot.as_deref()),
        Command::Analyze {
            config,
            symbol,
            as_of,
        } => run_analyze(&config, &symbol, as_of.as_deref()),
        Command::Size {
            balance,
            risk,
            entry,
            stop,
            multiplier,
        } => run_size(balance, risk, entry, stop, multiplier),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    FileConfigAdapter::from_file(path)
}

pub fn parse_as_of(value: &str) -> Result<NaiveDateTime, TraderError> {
    parse_timestamp(value).ok_or_else(|| {
        TraderError::validation(
            "as_of",
            format!("'{value}' is not a timestamp (expected YYYY-MM-DD[ HH:MM:SS])"),
        )
    })
}

pub fn build_orchestrator_config(
    config: &dyn ConfigPort,
) -> Result<OrchestratorConfig, TraderError> {
    let raw_symbols = config
        .get_string("agent", "symbols")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "agent".into(),
            key: "symbols".into(),
        })?;

    let stop_method = match config
        .get_string("risk", "stop_method")
        .map(|m| m.trim().to_lowercase())
        .as_deref()
    {
        None | Some("percent") => StopMethod::Percent,
        Some("atr") => StopMethod::Atr,
        Some(other) => {
            return Err(TraderError::config_invalid(
                "risk",
                "stop_method",
                format!("unknown stop_method '{other}'"),
            ));
        }
    };

    let poll = read_int(
        config,
        "agent",
        "poll_interval_secs",
        config_validation::DEFAULT_POLL_INTERVAL_SECS,
    )?;

    Ok(OrchestratorConfig {
        symbols: parse_symbols(&raw_symbols)?,
        timeframe: config
            .get_string("agent", "timeframe")
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| config_validation::DEFAULT_TIMEFRAME.to_string()),
        lookback_days: read_int(
            config,
            "agent",
            "lookback_days",
            config_validation::DEFAULT_LOOKBACK_DAYS,
        )?,
        poll_interval_secs: u64::try_from(poll).map_err(|_| {
            TraderError::config_invalid("agent", "poll_interval_secs", "must be non-negative")
        })?,
        risk_reward_ratio: read_double(
            config,
            "risk",
            "risk_reward_ratio",
            config_validation::DEFAULT_RISK_REWARD_RATIO,
        )?,
        stop_method,
        stop_loss_pct: read_double(
            config,
            "risk",
            "stop_loss_pct",
            config_validation::DEFAULT_STOP_LOSS_PCT,
        )?,
        asset_multiplier: read_double(config, "risk", "asset_multiplier", 1.0)?,
        max_holding_minutes: read_int(config, "risk", "max_holding_minutes", 0)?,
        trailing_stops: config.get_bool("risk", "trailing_stops", true),
        respect_regime_hold: config.get_bool("agent", "respect_regime_hold", true),
    })
}

pub fn build_risk_manager(config: &dyn ConfigPort) -> Result<RiskManager, TraderError> {
    let balance = config
        .get_string("risk", "account_balance")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "risk".into(),
            key: "account_balance".into(),
        })
        .and_then(|_| read_double(config, "risk", "account_balance", 0.0))?;
    RiskManager::new(
        balance,
        read_double(
            config,
            "risk",
            "risk_per_trade",
            config_validation::DEFAULT_RISK_PER_TRADE,
        )?,
        read_double(
            config,
            "risk",
            "daily_risk_limit",
            config_validation::DEFAULT_DAILY_RISK_LIMIT,
        )?,
    )
}

fn read_period(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TraderError> {
    let value = read_int(config, section, key, default as i64)?;
    usize::try_from(value)
        .map_err(|_| TraderError::config_invalid(section, key, format!("{key} must be at least 1")))
}

pub fn build_regime_config(config: &dyn ConfigPort) -> Result<RegimeConfig, TraderError> {
    let defaults = RegimeConfig::default();
    Ok(RegimeConfig {
        volatility_threshold: read_double(
            config,
            "regime",
            "volatility_threshold",
            defaults.volatility_threshold,
        )?,
        trend_strength_threshold: read_double(
            config,
            "regime",
            "trend_strength_threshold",
            defaults.trend_strength_threshold,
        )?,
        atr_period: read_period(config, "regime", "atr_period", defaults.atr_period)?,
        adx_period: read_period(config, "regime", "adx_period", defaults.adx_period)?,
    })
}

pub fn build_signal_config(config: &dyn ConfigPort) -> Result<SignalConfig, TraderError> {
    let defaults = SignalConfig::default();
    Ok(SignalConfig {
        short_period: read_period(config, "signal", "short_period", defaults.short_period)?,
        long_period: read_period(config, "signal", "long_period", defaults.long_period)?,
        swing_lookback: read_period(config, "signal", "swing_lookback", defaults.swing_lookback)?,
        volume_period: read_period(config, "signal", "volume_period", defaults.volume_period)?,
    })
}

/// Validate and wire every component named by `config`.
pub fn build_orchestrator(config: &dyn ConfigPort) -> Result<DecisionOrchestrator, TraderError> {
    validate_config(config)?;
    let orchestrator_config = build_orchestrator_config(config)?;
    let risk = build_risk_manager(config)?;
    let classifier = RegimeClassifier::new(build_regime_config(config)?);
    let generator = SignalGenerator::new(build_signal_config(config)?);
    let market_data = market_data_from_config(config)?;
    let broker = broker_from_config(config, risk.account_balance())?;
    Ok(DecisionOrchestrator::new(
        orchestrator_config,
        risk,
        classifier,
        generator,
        market_data,
        broker,
    ))
}

fn fail(err: &TraderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn outcome_exit_code(outcome: CycleOutcome) -> ExitCode {
    match outcome {
        CycleOutcome::Completed | CycleOutcome::Stopped => ExitCode::SUCCESS,
        CycleOutcome::DailyLimitReached => ExitCode::from(EXIT_DAILY_LIMIT),
    }
}

fn print_cycle(snapshot: &ControlSnapshot) {
    eprintln!(
        "\n=== Cycle {} ({}) ===",
        snapshot.cycle,
        snapshot
            .as_of
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    );
    for decision in &snapshot.decisions {
        eprintln!(
            "  {:<8} {:<18} {:<5} {}",
            decision.symbol,
            decision.conditions.regime.to_string(),
            decision.signal.to_string(),
            decision.note
        );
    }
    eprintln!(
        "  balance {:.2}  daily loss {:.2}  open positions {}",
        snapshot.account_balance,
        snapshot.daily_loss_incurred,
        snapshot.open_positions.len()
    );
}

pub fn write_snapshot(path: &Path, snapshot: &ControlSnapshot) -> Result<(), TraderError> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| TraderError::Io(std::io::Error::other(e)))?;
    fs::write(path, json)?;
    Ok(())
}

fn run_agent(
    config_path: &Path,
    cycles: Option<u64>,
    as_of: Option<&str>,
    snapshot_path: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return fail(&e),
    };

    let fixed_as_of = match as_of.map(parse_as_of).transpose() {
        Ok(t) => t,
        Err(e) => return fail(&e),
    };

    let mut orchestrator = match build_orchestrator(&adapter) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Trading {} symbol(s): {}",
        orchestrator.config().symbols.len(),
        orchestrator.config().symbols.join(", ")
    );

    let running = AtomicBool::new(true);
    let clock = || fixed_as_of.unwrap_or_else(|| Local::now().naive_local());
    let outcome = orchestrator.run(&running, cycles, clock, |snapshot| {
        print_cycle(snapshot);
        if let Some(path) = snapshot_path {
            if let Err(e) = write_snapshot(path, snapshot) {
                eprintln!("warning: failed to write snapshot: {e}");
            }
        }
    });

    match outcome {
        CycleOutcome::DailyLimitReached => {
            eprintln!("\nDaily risk limit reached. Trading halted.");
        }
        _ => eprintln!("\nAgent stopped after {} cycle(s).", orchestrator.snapshot().cycle),
    }
    outcome_exit_code(outcome)
}

#[derive(Debug, Serialize)]
pub struct Analysis {
    pub symbol: String,
    pub as_of: NaiveDateTime,
    pub bars: usize,
    pub latest_close: Option<f64>,
    pub conditions: MarketConditions,
    pub adjustment: StrategyAdjustment,
    pub signal: Signal,
    pub intent: Option<PositionIntent>,
}

pub fn analyze_symbol(
    config: &dyn ConfigPort,
    symbol: &str,
    as_of: NaiveDateTime,
) -> Result<Analysis, TraderError> {
    validate_config(config)?;
    let orchestrator_config = build_orchestrator_config(config)?;
    let risk = build_risk_manager(config)?;
    let regime_config = build_regime_config(config)?;
    let atr_period = regime_config.atr_period;
    let classifier = RegimeClassifier::new(regime_config);
    let generator = SignalGenerator::new(build_signal_config(config)?);
    let market_data = market_data_from_config(config)?;

    let start = lookback_start(as_of, orchestrator_config.lookback_days).ok_or_else(|| {
        TraderError::config_invalid("agent", "lookback_days", "lookback window starts out of range")
    })?;
    let bars = market_data.fetch_historical(
        &symbol.to_uppercase(),
        &orchestrator_config.timeframe,
        start,
        as_of,
    )?;

    let conditions = classifier.classify(&bars);
    let adjustment = AdjustmentAdvisor::new().suggest(&conditions);
    let signal = generator.generate(&bars);
    let latest_close = bars.last().map(|b| b.close).filter(|c| c.is_finite());

    let atr = calculate_atr(&bars, atr_period).ok().and_then(|s| s.latest());
    let intent = match (PositionSide::from_signal(signal), latest_close) {
        (Some(side), Some(entry)) => plan_intent(
            &risk,
            &orchestrator_config,
            &adjustment,
            side,
            entry,
            atr,
        ),
        _ => None,
    };

    Ok(Analysis {
        symbol: symbol.to_uppercase(),
        as_of,
        bars: bars.len(),
        latest_close,
        conditions,
        adjustment,
        signal,
        intent,
    })
}

fn run_analyze(config_path: &Path, symbol: &str, as_of: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return fail(&e),
    };
    let as_of = match as_of.map(parse_as_of).transpose() {
        Ok(t) => t.unwrap_or_else(|| Local::now().naive_local()),
        Err(e) => return fail(&e),
    };

    let analysis = match analyze_symbol(&adapter, symbol, as_of) {
        Ok(a) => a,
        Err(e) => return fail(&e),
    };

    match serde_json::to_string_pretty(&analysis) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&TraderError::Io(std::io::Error::other(e))),
    }
}

fn run_size(balance: f64, risk: f64, entry: f64, stop: f64, multiplier: f64) -> ExitCode {
    let manager = match RiskManager::new(balance, risk, 1.0) {
        Ok(m) => m,
        Err(e) => return fail(&e),
    };
    let quantity = manager.size_position(entry, stop, multiplier);
    if quantity <= 0.0 {
        return fail(&TraderError::validation(
            "stop",
            "entry and stop must be positive and differ",
        ));
    }

    eprintln!("Risk amount:   {:.2}", balance * risk);
    eprintln!("Stop distance: {:.4}", (entry - stop).abs());
    println!("{quantity:.4}");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return fail(&e),
    };

    let orchestrator = match build_orchestrator(&adapter) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };

    let config = orchestrator.config();
    let risk = orchestrator.risk();
    eprintln!("\nAgent:");
    eprintln!("  symbols:   {}", config.symbols.join(", "));
    eprintln!("  timeframe: {}", config.timeframe);
    eprintln!("  lookback:  {} days", config.lookback_days);
    eprintln!("\nRisk:");
    eprintln!("  balance:          {:.2}", risk.account_balance());
    eprintln!("  daily loss limit: {:.2}", risk.daily_loss_limit());
    eprintln!("  stop method:      {:?}", config.stop_method);
    eprintln!("\nConfig is valid");
    ExitCode::SUCCESS
}
