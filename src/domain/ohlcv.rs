//! Daily OHLCV bar and history request types.

use chrono::{Days, Months, NaiveDate};

use super::error::DeskError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Simple return from `prev` close to this bar's close.
    pub fn return_since(&self, prev: &Bar) -> Option<f64> {
        if prev.close > 0.0 {
            Some(self.close / prev.close - 1.0)
        } else {
            None
        }
    }
}

/// Amount of history to request, in the broker's `"N U"` notation
/// (`20 D`, `3 W`, `6 M`, `2 Y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDuration {
    Days(u32),
    Weeks(u32),
    Months(u32),
    Years(u32),
}

impl HistoryDuration {
    pub fn parse(input: &str) -> Result<Self, DeskError> {
        let invalid = |reason: &str| DeskError::config_invalid("cli", "duration", reason);
        let mut parts = input.split_whitespace();
        let (Some(count), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid("expected \"<count> <D|W|M|Y>\""));
        };
        let n: u32 = count
            .parse()
            .map_err(|_| invalid("count must be a positive integer"))?;
        if n == 0 {
            return Err(invalid("count must be a positive integer"));
        }
        match unit.to_uppercase().as_str() {
            "D" => Ok(HistoryDuration::Days(n)),
            "W" => Ok(HistoryDuration::Weeks(n)),
            "M" => Ok(HistoryDuration::Months(n)),
            "Y" if n.checked_mul(12).is_some() => Ok(HistoryDuration::Years(n)),
            "Y" => Err(invalid("year count too large")),
            _ => Err(invalid("unit must be one of D, W, M, Y")),
        }
    }

    /// Earliest date covered when the window ends at `end`.
    ///
    /// `Days` counts trading bars, not calendar days, so it has no calendar
    /// start and returns `None`.
    pub fn calendar_start(&self, end: NaiveDate) -> Option<NaiveDate> {
        match *self {
            HistoryDuration::Days(_) => None,
            HistoryDuration::Weeks(n) => end.checked_sub_days(Days::new(7 * u64::from(n))),
            HistoryDuration::Months(n) => end.checked_sub_months(Months::new(n)),
            HistoryDuration::Years(n) => end.checked_sub_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Trim an ordered bar series to the trailing window this duration covers.
    pub fn trailing<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        let Some(last) = bars.last() else {
            return bars;
        };
        match (self, self.calendar_start(last.date)) {
            (HistoryDuration::Days(n), _) => {
                let n = *n as usize;
                &bars[bars.len().saturating_sub(n)..]
            }
            (_, Some(start)) => {
                let first = bars.partition_point(|b| b.date <= start);
                &bars[first..]
            }
            (_, None) => bars,
        }
    }
}

impl std::fmt::Display for HistoryDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryDuration::Days(n) => write!(f, "{n} D"),
            HistoryDuration::Weeks(n) => write!(f, "{n} W"),
            HistoryDuration::Months(n) => write!(f, "{n} M"),
            HistoryDuration::Years(n) => write!(f, "{n} Y"),
        }
    }
}

/// Bar granularity. Only daily bars are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSize {
    OneDay,
}

impl BarSize {
    pub fn parse(input: &str) -> Result<Self, DeskError> {
        match input.trim().to_lowercase().as_str() {
            "1 day" | "1d" | "daily" => Ok(BarSize::OneDay),
            other => Err(DeskError::config_invalid(
                "cli",
                "bar_size",
                format!("unsupported bar size '{other}' (only '1 day')"),
            )),
        }
    }
}

impl std::fmt::Display for BarSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("1 day")
    }
}

/// A request for `duration` worth of `bar_size` bars ending at the most
/// recent available bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    pub duration: HistoryDuration,
    pub bar_size: BarSize,
}

impl HistoryRequest {
    pub fn parse(duration: &str, bar_size: &str) -> Result<Self, DeskError> {
        Ok(HistoryRequest {
            duration: HistoryDuration::parse(duration)?,
            bar_size: BarSize::parse(bar_size)?,
        })
    }
}
