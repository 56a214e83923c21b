//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for revdesk.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("insufficient history for {symbol} on {date}: have {bars} bars, need {required}")]
    InsufficientHistory {
        symbol: String,
        date: NaiveDate,
        bars: usize,
        required: usize,
    },

    #[error("invalid reference price for {symbol}: {}", describe_price(.price))]
    InvalidPrice { symbol: String, price: Option<f64> },

    #[error("risk limit violation: {}", .violations.join("; "))]
    RiskLimitViolation { violations: Vec<String> },

    #[error("order submission failed for {symbol}: {reason}")]
    OrderSubmission { symbol: String, reason: String },

    #[error("data source unavailable: {reason}")]
    DataSourceUnavailable { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("malformed bars for {symbol}: {reason}")]
    MalformedBars { symbol: String, reason: String },

    #[error("backtest aborted on {date} (last good date: {}): {source}", describe_date(.last_good_date))]
    BacktestAborted {
        date: NaiveDate,
        last_good_date: Option<NaiveDate>,
        #[source]
        source: Box<DeskError>,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("record sink error: {reason}")]
    Record { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe_price(price: &Option<f64>) -> String {
    match price {
        Some(p) => p.to_string(),
        None => "missing".to_string(),
    }
}

fn describe_date(date: &Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.to_string(),
        None => "none".to_string(),
    }
}

impl DeskError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        DeskError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures that only affect a single symbol and may be skipped
    /// in live mode.
    pub fn is_symbol_local(&self) -> bool {
        matches!(
            self,
            DeskError::InsufficientHistory { .. }
                | DeskError::InvalidPrice { .. }
                | DeskError::OrderSubmission { .. }
                | DeskError::NoData { .. }
                | DeskError::MalformedBars { .. }
        )
    }
}

impl From<&DeskError> for std::process::ExitCode {
    fn from(err: &DeskError) -> Self {
        let code: u8 = match err {
            DeskError::Io(_) | DeskError::Record { .. } => 1,
            DeskError::ConfigParse { .. }
            | DeskError::ConfigMissing { .. }
            | DeskError::ConfigInvalid { .. } => 2,
            DeskError::DataSourceUnavailable { .. } | DeskError::MalformedBars { .. } => 3,
            DeskError::RiskLimitViolation { .. } => 4,
            DeskError::NoData { .. } | DeskError::InsufficientHistory { .. } => 5,
            DeskError::InvalidPrice { .. }
            | DeskError::OrderSubmission { .. }
            | DeskError::BacktestAborted { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_price_message_names_missing_price() {
        let err = DeskError::InvalidPrice {
            symbol: "SPY".into(),
            price: None,
        };
        assert_eq!(err.to_string(), "invalid reference price for SPY: missing");
    }

    #[test]
    fn risk_violation_joins_all_messages() {
        let err = DeskError::RiskLimitViolation {
            violations: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "risk limit violation: a; b");
    }

    #[test]
    fn backtest_abort_reports_last_good_date() {
        let err = DeskError::BacktestAborted {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            last_good_date: NaiveDate::from_ymd_opt(2024, 3, 4),
            source: Box::new(DeskError::InvalidPrice {
                symbol: "QQQ".into(),
                price: Some(0.0),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-03-05"));
        assert!(msg.contains("last good date: 2024-03-04"));
        assert!(msg.contains("QQQ"));
    }

    #[test]
    fn symbol_local_classification() {
        assert!(
            DeskError::NoData {
                symbol: "X".into()
            }
            .is_symbol_local()
        );
        assert!(
            DeskError::MalformedBars {
                symbol: "X".into(),
                reason: "bad close".into()
            }
            .is_symbol_local()
        );
        assert!(
            !DeskError::DataSourceUnavailable {
                reason: "down".into()
            }
            .is_symbol_local()
        );
    }
}
