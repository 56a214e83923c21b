//! In-memory bar store: one ordered daily series per symbol plus the unified
//! trading calendar across symbols.

use crate::domain::error::DeskError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SymbolSeries {
    /// Build a series, sorting by date. Duplicate dates are rejected.
    pub fn new(symbol: String, mut bars: Vec<Bar>) -> Result<Self, DeskError> {
        bars.sort_by_key(|b| b.date);
        if let Some(w) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(DeskError::MalformedBars {
                symbol,
                reason: format!("duplicate bar date {}", w[0].date),
            });
        }
        if let Some(b) = bars.iter().find(|b| b.symbol != symbol) {
            return Err(DeskError::MalformedBars {
                reason: format!("bar for {} on {} in series", b.symbol, b.date),
                symbol,
            });
        }
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(Self {
            symbol,
            bars,
            date_index,
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&Bar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// Most recent bar dated on or before `date`.
    pub fn bar_at_or_before(&self, date: NaiveDate) -> Option<&Bar> {
        let end = self.bars.partition_point(|b| b.date <= date);
        end.checked_sub(1).map(|i| &self.bars[i])
    }

    /// The `lookback` bars ending exactly at `date`.
    ///
    /// Never reaches past `date`, so callers cannot observe later bars.
    pub fn window(&self, date: NaiveDate, lookback: usize) -> Result<&[Bar], DeskError> {
        let insufficient = |bars: usize| DeskError::InsufficientHistory {
            symbol: self.symbol.clone(),
            date,
            bars,
            required: lookback,
        };
        let Some(&idx) = self.date_index.get(&date) else {
            return Err(insufficient(0));
        };
        let available = idx + 1;
        if available < lookback {
            return Err(insufficient(available));
        }
        Ok(&self.bars[available - lookback..available])
    }
}

#[derive(Debug, Clone, Default)]
pub struct BarStore {
    series: BTreeMap<String, SymbolSeries>,
}

impl BarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, bars: Vec<Bar>) -> Result<(), DeskError> {
        let series = SymbolSeries::new(symbol.to_string(), bars)?;
        self.series.insert(symbol.to_string(), series);
        Ok(())
    }

    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Result<Self, DeskError> {
        let mut grouped: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            grouped.entry(bar.symbol.clone()).or_default().push(bar);
        }
        let mut store = BarStore::new();
        for (symbol, bars) in grouped {
            store.insert(&symbol, bars)?;
        }
        Ok(store)
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.series.get(symbol)
    }

    /// Symbols in sorted order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn window(
        &self,
        symbol: &str,
        date: NaiveDate,
        lookback: usize,
    ) -> Result<&[Bar], DeskError> {
        match self.series.get(symbol) {
            Some(series) => series.window(date, lookback),
            None => Err(DeskError::InsufficientHistory {
                symbol: symbol.to_string(),
                date,
                bars: 0,
                required: lookback,
            }),
        }
    }

    /// Close on exactly `date`, if the symbol traded that day.
    pub fn close_on(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.series
            .get(symbol)
            .and_then(|s| s.get_bar(date))
            .map(|b| b.close)
    }

    /// Last known close on or before `date`.
    pub fn mark_price(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.series
            .get(symbol)
            .and_then(|s| s.bar_at_or_before(date))
            .map(|b| b.close)
    }

    /// Union of all bar dates across symbols, ascending.
    pub fn timeline(&self) -> Vec<NaiveDate> {
        let unique_dates: BTreeSet<NaiveDate> = self
            .series
            .values()
            .flat_map(|s| s.bars.iter().map(|bar| bar.date))
            .collect();
        unique_dates.into_iter().collect()
    }
}
