//! Configuration validation.
//!
//! Validates every agent, risk, regime and signal key before a run starts.
//! Missing optional keys take their documented defaults; present keys that
//! do not parse are rejected instead of silently defaulted.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use std::collections::HashSet;

pub const DEFAULT_TIMEFRAME: &str = "1D";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 120;
pub const DEFAULT_POLL_INTERVAL_SECS: i64 = 60;
pub const DEFAULT_RISK_PER_TRADE: f64 = 0.01;
pub const DEFAULT_DAILY_RISK_LIMIT: f64 = 0.05;
pub const DEFAULT_RISK_REWARD_RATIO: f64 = 2.0;
pub const DEFAULT_STOP_LOSS_PCT: f64 = 0.02;
/// A century of history; keeps the fetch window start representable.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;
/// Ten years of wall-clock minutes.
pub const MAX_HOLDING_MINUTES: i64 = 5_256_000;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_agent_config(config)?;
    validate_risk_config(config)?;
    validate_regime_config(config)?;
    validate_signal_config(config)?;
    Ok(())
}

pub fn validate_agent_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let raw = config
        .get_string("agent", "symbols")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "agent".into(),
            key: "symbols".into(),
        })?;
    parse_symbols(&raw)?;

    if let Some(tf) = config.get_string("agent", "timeframe") {
        if tf.trim().is_empty() {
            return Err(TraderError::config_invalid("agent", "timeframe", "timeframe must not be empty"));
        }
    }

    let lookback = read_int(config, "agent", "lookback_days", DEFAULT_LOOKBACK_DAYS)?;
    if lookback <= 0 {
        return Err(TraderError::config_invalid(
            "agent",
            "lookback_days",
            "lookback_days must be positive",
        ));
    }
    if lookback > MAX_LOOKBACK_DAYS {
        return Err(TraderError::config_invalid(
            "agent",
            "lookback_days",
            format!("lookback_days must be at most {MAX_LOOKBACK_DAYS}"),
        ));
    }

    let poll = read_int(config, "agent", "poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS)?;
    if poll < 0 {
        return Err(TraderError::config_invalid(
            "agent",
            "poll_interval_secs",
            "poll_interval_secs must be non-negative",
        ));
    }
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_string("risk", "account_balance").is_none() {
        return Err(TraderError::ConfigMissing {
            section: "risk".into(),
            key: "account_balance".into(),
        });
    }
    let balance = read_double(config, "risk", "account_balance", 0.0)?;
    if balance <= 0.0 {
        return Err(TraderError::config_invalid(
            "risk",
            "account_balance",
            "account_balance must be positive",
        ));
    }

    for (key, default) in [
        ("risk_per_trade", DEFAULT_RISK_PER_TRADE),
        ("daily_risk_limit", DEFAULT_DAILY_RISK_LIMIT),
    ] {
        let value = read_double(config, "risk", key, default)?;
        if !(value > 0.0 && value <= 1.0) {
            return Err(TraderError::config_invalid(
                "risk",
                key,
                format!("{key} must be between 0 (exclusive) and 1 (inclusive)"),
            ));
        }
    }

    let ratio = read_double(config, "risk", "risk_reward_ratio", DEFAULT_RISK_REWARD_RATIO)?;
    if ratio <= 0.0 {
        return Err(TraderError::config_invalid(
            "risk",
            "risk_reward_ratio",
            "risk_reward_ratio must be positive",
        ));
    }

    if let Some(method) = config.get_string("risk", "stop_method") {
        if !matches!(method.trim().to_lowercase().as_str(), "percent" | "atr") {
            return Err(TraderError::config_invalid(
                "risk",
                "stop_method",
                format!("unknown stop_method '{}' (expected percent or atr)", method.trim()),
            ));
        }
    }

    let pct = read_double(config, "risk", "stop_loss_pct", DEFAULT_STOP_LOSS_PCT)?;
    if !(pct > 0.0 && pct < 1.0) {
        return Err(TraderError::config_invalid(
            "risk",
            "stop_loss_pct",
            "stop_loss_pct must be between 0 and 1",
        ));
    }

    let multiplier = read_double(config, "risk", "asset_multiplier", 1.0)?;
    if multiplier <= 0.0 {
        return Err(TraderError::config_invalid(
            "risk",
            "asset_multiplier",
            "asset_multiplier must be positive",
        ));
    }

    let holding = read_int(config, "risk", "max_holding_minutes", 0)?;
    if holding < 0 {
        return Err(TraderError::config_invalid(
            "risk",
            "max_holding_minutes",
            "max_holding_minutes must be non-negative",
        ));
    }
    if holding > MAX_HOLDING_MINUTES {
        return Err(TraderError::config_invalid(
            "risk",
            "max_holding_minutes",
            format!("max_holding_minutes must be at most {MAX_HOLDING_MINUTES}"),
        ));
    }
    Ok(())
}

pub fn validate_regime_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let threshold = read_double(config, "regime", "volatility_threshold", 0.02)?;
    if threshold <= 0.0 {
        return Err(TraderError::config_invalid(
            "regime",
            "volatility_threshold",
            "volatility_threshold must be positive",
        ));
    }

    let strength = read_double(config, "regime", "trend_strength_threshold", 20.0)?;
    if !(0.0..100.0).contains(&strength) {
        return Err(TraderError::config_invalid(
            "regime",
            "trend_strength_threshold",
            "trend_strength_threshold must be between 0 and 100",
        ));
    }

    for key in ["atr_period", "adx_period"] {
        validate_period(config, "regime", key, 14)?;
    }
    Ok(())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let short = validate_period(config, "signal", "short_period", 14)?;
    let long = validate_period(config, "signal", "long_period", 50)?;
    validate_period(config, "signal", "swing_lookback", 20)?;
    validate_period(config, "signal", "volume_period", 20)?;

    if short >= long {
        return Err(TraderError::config_invalid(
            "signal",
            "short_period",
            "short_period must be less than long_period",
        ));
    }
    Ok(())
}

fn validate_period(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TraderError> {
    let value = read_int(config, section, key, default)?;
    if value < 1 {
        return Err(TraderError::config_invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(value)
}

/// Comma separated symbol list, trimmed and upper-cased. Empty tokens and
/// duplicates are rejected.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, TraderError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(TraderError::config_invalid("agent", "symbols", "empty token in symbol list"));
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(TraderError::config_invalid(
                "agent",
                "symbols",
                format!("duplicate symbol: {symbol}"),
            ));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// `default` when the key is absent; an error when it is present but not a number.
pub fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TraderError> {
    if config.get_string(section, key).is_none() {
        return Ok(default);
    }
    let value = config.get_double(section, key, f64::NAN);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TraderError::config_invalid(section, key, "not a number"))
    }
}

/// `default` when the key is absent; an error when it is present but not an integer.
pub fn read_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<i64>()
        .map_err(|_| TraderError::config_invalid(section, key, "not an integer"))
}
