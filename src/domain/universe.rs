//! Trading universe: symbol list parsing and bar loading.
//!
//! Parses the configured symbol list and pulls each symbol's history through
//! a [`DataPort`], skipping symbols that come back empty or too short.

use crate::domain::bar_store::BarStore;
use crate::domain::error::DeskError;
use crate::domain::ohlcv::HistoryRequest;
use crate::ports::data_port::DataPort;
use std::collections::HashSet;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

impl From<UniverseError> for DeskError {
    fn from(err: UniverseError) -> Self {
        DeskError::config_invalid("universe", "symbols", err.to_string())
    }
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug)]
pub struct LoadedUniverse {
    /// Symbols that made it into `store`, in configured order.
    pub symbols: Vec<String>,
    pub store: BarStore,
    pub skipped: Vec<DeskError>,
}

/// Fetch history for every symbol.
///
/// Symbols with no bars or fewer than `min_bars` are skipped with a warning.
/// A data source outage or malformed series aborts the load. If nothing
/// survives the result is [`DeskError::NoData`].
pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    request: &HistoryRequest,
    min_bars: usize,
) -> Result<LoadedUniverse, DeskError> {
    let mut store = BarStore::new();
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let bars = match data_port.fetch_bars(symbol, request) {
            Ok(bars) => bars,
            Err(e @ DeskError::NoData { .. }) => {
                tracing::warn!(symbol = %symbol, "skipping symbol: no data");
                skipped.push(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        if bars.is_empty() {
            tracing::warn!(symbol = %symbol, "skipping symbol: no data");
            skipped.push(DeskError::NoData {
                symbol: symbol.clone(),
            });
            continue;
        }

        if bars.len() < min_bars {
            let last = bars[bars.len() - 1].date;
            tracing::warn!(
                symbol = %symbol,
                bars = bars.len(),
                required = min_bars,
                "skipping symbol: insufficient history"
            );
            skipped.push(DeskError::InsufficientHistory {
                symbol: symbol.clone(),
                date: last,
                bars: bars.len(),
                required: min_bars,
            });
            continue;
        }

        tracing::debug!(symbol = %symbol, bars = bars.len(), "loaded bars");
        store.insert(symbol, bars)?;
        loaded.push(symbol.clone());
    }

    if loaded.is_empty() {
        return Err(DeskError::NoData {
            symbol: "all".to_string(),
        });
    }

    if !skipped.is_empty() {
        tracing::info!(
            loaded = loaded.len(),
            requested = symbols.len(),
            "universe partially loaded"
        );
    }

    Ok(LoadedUniverse {
        symbols: loaded,
        store,
        skipped,
    })
}
