//! Configuration validation.
//!
//! Checks every key the desk reads before any run starts. The first offending
//! key is reported.

use crate::domain::error::DeskError;
use crate::domain::order::OrderType;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;

pub const PAPER_PORT: i64 = 7497;
pub const LIVE_PORT: i64 = 7496;
pub const KNOWN_STRATEGIES: &[&str] = &["reversal"];

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), DeskError> {
    validate_universe(config)?;
    validate_risk(config)?;
    validate_strategy(config)?;
    validate_ibkr(config)?;
    validate_capital(config)?;
    Ok(())
}

/// Parse `[section] key` as a float, falling back to `default` when absent.
/// A present but unparsable value is an error rather than a silent default.
pub fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, DeskError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DeskError::config_invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

pub fn integer(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, DeskError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            DeskError::config_invalid(section, key, format!("'{raw}' is not an integer"))
        }),
    }
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), DeskError> {
    if !config.has_key("universe", "symbols") {
        return Err(DeskError::ConfigMissing {
            section: "universe".to_string(),
            key: "symbols".to_string(),
        });
    }
    parse_symbols(&config.get_string("universe", "symbols").unwrap_or_default())?;
    Ok(())
}

fn validate_fraction(config: &dyn ConfigPort, key: &str, default: f64) -> Result<(), DeskError> {
    let value = number(config, "risk", key, default)?;
    if value <= 0.0 || value > 1.0 {
        return Err(DeskError::config_invalid(
            "risk",
            key,
            format!("{key} must be in (0, 1]"),
        ));
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), DeskError> {
    validate_fraction(config, "max_position_pct", 0.2)?;
    validate_fraction(config, "max_gross_exposure", 1.0)
}

fn validate_strategy(config: &dyn ConfigPort) -> Result<(), DeskError> {
    let name = config
        .get_string("strategy", "name")
        .unwrap_or_else(|| "reversal".to_string());
    if !KNOWN_STRATEGIES.contains(&name.trim().to_lowercase().as_str()) {
        return Err(DeskError::config_invalid(
            "strategy",
            "name",
            format!("unknown strategy '{}'", name.trim()),
        ));
    }

    if integer(config, "strategy", "lookback", 2)? < 2 {
        return Err(DeskError::config_invalid(
            "strategy",
            "lookback",
            "lookback must be at least 2",
        ));
    }

    if number(config, "strategy", "threshold", 0.0)? < 0.0 {
        return Err(DeskError::config_invalid(
            "strategy",
            "threshold",
            "threshold must be non-negative",
        ));
    }
    Ok(())
}

fn validate_ibkr(config: &dyn ConfigPort) -> Result<(), DeskError> {
    let port = integer(config, "ibkr", "port", PAPER_PORT)?;
    if !(1..=65_535).contains(&port) {
        return Err(DeskError::config_invalid(
            "ibkr",
            "port",
            "port must be between 1 and 65535",
        ));
    }

    if integer(config, "ibkr", "client_id", 1)? < 0 {
        return Err(DeskError::config_invalid(
            "ibkr",
            "client_id",
            "client_id must be non-negative",
        ));
    }

    if let Some(order_type) = config.get_string("ibkr", "order_type") {
        OrderType::parse(&order_type)?;
    }

    if number(config, "ibkr", "fill_timeout_seconds", 60.0)? <= 0.0 {
        return Err(DeskError::config_invalid(
            "ibkr",
            "fill_timeout_seconds",
            "fill_timeout_seconds must be positive",
        ));
    }
    Ok(())
}

fn validate_capital(config: &dyn ConfigPort) -> Result<(), DeskError> {
    if number(config, "backtest", "initial_capital", 100_000.0)? <= 0.0 {
        return Err(DeskError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if number(config, "paper", "cash", 100_000.0)? < 0.0 {
        return Err(DeskError::config_invalid(
            "paper",
            "cash",
            "cash must be non-negative",
        ));
    }
    Ok(())
}
