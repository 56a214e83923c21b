//! Signal generation.
//!
//! A [`SignalGenerator`] maps a bounded bar window to a long/flat
//! [`SignalValue`]. Generators only ever see the window they are handed, so a
//! signal for date D is a pure function of bars dated on or before D.

use crate::domain::bar_store::BarStore;
use crate::domain::error::DeskError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalValue {
    Flat,
    Long,
}

impl SignalValue {
    pub fn as_i8(self) -> i8 {
        match self {
            SignalValue::Flat => 0,
            SignalValue::Long => 1,
        }
    }

    pub fn is_long(self) -> bool {
        self == SignalValue::Long
    }
}

pub trait SignalGenerator {
    fn name(&self) -> &str;

    /// Number of bars the window must contain.
    fn lookback(&self) -> usize;

    /// Evaluate a window of exactly `lookback()` bars, oldest first.
    fn evaluate(&self, window: &[Bar]) -> SignalValue;
}

/// Short-term reversal: long when the window's close-to-close return is below
/// `-threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reversal {
    pub lookback: usize,
    pub threshold: f64,
}

impl Default for Reversal {
    fn default() -> Self {
        Reversal {
            lookback: 2,
            threshold: 0.0,
        }
    }
}

impl Reversal {
    pub fn new(lookback: usize, threshold: f64) -> Self {
        Reversal {
            lookback,
            threshold,
        }
    }

    /// Close-to-close return across the window.
    pub fn window_return(window: &[Bar]) -> Option<f64> {
        match (window.first(), window.last()) {
            (Some(first), Some(last)) if window.len() >= 2 => last.return_since(first),
            _ => None,
        }
    }
}

impl SignalGenerator for Reversal {
    fn name(&self) -> &str {
        "reversal"
    }

    fn lookback(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, window: &[Bar]) -> SignalValue {
        match Self::window_return(window) {
            Some(r) if r < -self.threshold => SignalValue::Long,
            _ => SignalValue::Flat,
        }
    }
}

/// Signal for `symbol` on `date` using only the lookback window ending there.
pub fn signal_on(
    generator: &dyn SignalGenerator,
    store: &BarStore,
    symbol: &str,
    date: NaiveDate,
) -> Result<SignalValue, DeskError> {
    let window = store.window(symbol, date, generator.lookback())?;
    Ok(generator.evaluate(window))
}

/// Signal from the most recent `lookback` bars of an ordered series.
pub fn latest_signal(
    generator: &dyn SignalGenerator,
    symbol: &str,
    bars: &[Bar],
) -> Result<SignalValue, DeskError> {
    let lookback = generator.lookback();
    if bars.is_empty() {
        return Err(DeskError::NoData {
            symbol: symbol.to_string(),
        });
    }
    if bars.len() < lookback {
        return Err(DeskError::InsufficientHistory {
            symbol: symbol.to_string(),
            date: bars[bars.len() - 1].date,
            bars: bars.len(),
            required: lookback,
        });
    }
    Ok(generator.evaluate(&bars[bars.len() - lookback..]))
}

/// Signals for one decision date. Symbols lacking history are listed in
/// `skipped` rather than failing the date.
#[derive(Debug)]
pub struct SignalSet {
    pub date: NaiveDate,
    pub signals: BTreeMap<String, SignalValue>,
    pub skipped: Vec<DeskError>,
}

impl SignalSet {
    pub fn longs(&self) -> Vec<&str> {
        self.signals
            .iter()
            .filter(|(_, s)| s.is_long())
            .map(|(sym, _)| sym.as_str())
            .collect()
    }

    pub fn get(&self, symbol: &str) -> SignalValue {
        self.signals.get(symbol).copied().unwrap_or(SignalValue::Flat)
    }
}

pub fn generate_signals<'a>(
    generator: &dyn SignalGenerator,
    store: &BarStore,
    symbols: impl IntoIterator<Item = &'a str>,
    date: NaiveDate,
) -> SignalSet {
    let mut signals = BTreeMap::new();
    let mut skipped = Vec::new();
    for symbol in symbols {
        match signal_on(generator, store, symbol, date) {
            Ok(signal) => {
                signals.insert(symbol.to_string(), signal);
            }
            Err(e) => {
                tracing::debug!(symbol, %date, error = %e, "symbol excluded from universe");
                skipped.push(e);
            }
        }
    }
    SignalSet {
        date,
        signals,
        skipped,
    }
}
