#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use revdesk::domain::error::DeskError;
use revdesk::domain::metrics::EquityPoint;
pub use revdesk::domain::ohlcv::{Bar, HistoryRequest};
use revdesk::domain::order::{Fill, Order, Trade};
use revdesk::domain::position::Position;
use revdesk::domain::snapshot::{PortfolioSnapshot, PositionRow, SnapshotHistory};
use revdesk::ports::broker_port::BrokerPort;
use revdesk::ports::data_port::DataPort;
use revdesk::ports::record_port::RecordPort;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
    pub unavailable: bool,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            unavailable: false,
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn offline(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str, request: &HistoryRequest) -> Result<Vec<Bar>, DeskError> {
        if self.unavailable {
            return Err(DeskError::DataSourceUnavailable {
                reason: "mock offline".into(),
            });
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(DeskError::MalformedBars {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            Some(bars) => Ok(request.duration.trailing(bars).to_vec()),
            None => Err(DeskError::NoData {
                symbol: symbol.to_string(),
            }),
        }
    }
}

/// Broker that fills at fixed marks and tracks cash + positions in memory.
pub struct MockBroker {
    pub cash: Cell<f64>,
    pub positions: RefCell<BTreeMap<String, Position>>,
    pub marks: BTreeMap<String, f64>,
    pub reject: HashSet<String>,
    pub never_fill: HashSet<String>,
    pub submitted: RefCell<Vec<Order>>,
    pub positions_unavailable: bool,
}

impl MockBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            cash: Cell::new(cash),
            positions: RefCell::new(BTreeMap::new()),
            marks: BTreeMap::new(),
            reject: HashSet::new(),
            never_fill: HashSet::new(),
            submitted: RefCell::new(Vec::new()),
            positions_unavailable: false,
        }
    }

    pub fn with_mark(mut self, symbol: &str, price: f64) -> Self {
        self.marks.insert(symbol.to_string(), price);
        self
    }

    pub fn with_position(self, symbol: &str, quantity: i64, avg_cost: f64) -> Self {
        self.positions
            .borrow_mut()
            .insert(symbol.to_string(), Position::new(symbol, quantity, avg_cost));
        self
    }

    pub fn rejecting(mut self, symbol: &str) -> Self {
        self.reject.insert(symbol.to_string());
        self
    }

    pub fn never_filling(mut self, symbol: &str) -> Self {
        self.never_fill.insert(symbol.to_string());
        self
    }

    pub fn quantity(&self, symbol: &str) -> i64 {
        self.positions
            .borrow()
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(0)
    }

    /// Move cash so the account is worth exactly `value` at current marks.
    pub fn set_value(&self, value: f64) {
        let held: f64 = self
            .positions
            .borrow()
            .values()
            .map(|p| p.quantity as f64 * self.marks.get(&p.symbol).copied().unwrap_or(0.0))
            .sum();
        self.cash.set(value - held);
    }
}

impl BrokerPort for MockBroker {
    fn fetch_positions(&self) -> Result<Vec<Position>, DeskError> {
        if self.positions_unavailable {
            return Err(DeskError::DataSourceUnavailable {
                reason: "broker offline".into(),
            });
        }
        Ok(self.positions.borrow().values().cloned().collect())
    }

    fn portfolio_value(&self) -> Result<f64, DeskError> {
        let held: f64 = self
            .positions
            .borrow()
            .values()
            .map(|p| p.quantity as f64 * self.marks.get(&p.symbol).copied().unwrap_or(0.0))
            .sum();
        Ok(self.cash.get() + held)
    }

    fn submit_order(&self, order: &Order, _timeout: Duration) -> Result<Fill, DeskError> {
        self.submitted.borrow_mut().push(order.clone());
        if self.reject.contains(&order.symbol) {
            return Err(DeskError::OrderSubmission {
                symbol: order.symbol.clone(),
                reason: "rejected by mock".into(),
            });
        }
        if self.never_fill.contains(&order.symbol) {
            return Ok(Fill {
                filled: false,
                filled_quantity: 0,
                avg_price: 0.0,
            });
        }
        let price = self.marks.get(&order.symbol).copied().unwrap_or(0.0);
        let signed = order.signed_quantity();
        self.cash.set(self.cash.get() - signed as f64 * price);
        let mut positions = self.positions.borrow_mut();
        let entry = positions
            .entry(order.symbol.clone())
            .or_insert_with(|| Position::new(order.symbol.clone(), 0, price));
        entry.quantity += signed;
        if entry.quantity == 0 {
            positions.remove(&order.symbol);
        }
        Ok(Fill {
            filled: true,
            filled_quantity: order.quantity,
            avg_price: price,
        })
    }
}

#[derive(Default)]
pub struct MemoryRecords {
    pub trades: RefCell<Vec<Trade>>,
    pub positions: RefCell<Vec<PositionRow>>,
    pub snapshots: RefCell<Vec<PortfolioSnapshot>>,
    pub equity: RefCell<Vec<EquityPoint>>,
}

impl RecordPort for MemoryRecords {
    fn append_trades(&self, trades: &[Trade]) -> Result<(), DeskError> {
        self.trades.borrow_mut().extend_from_slice(trades);
        Ok(())
    }

    fn append_positions(&self, rows: &[PositionRow]) -> Result<(), DeskError> {
        self.positions.borrow_mut().extend_from_slice(rows);
        Ok(())
    }

    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), DeskError> {
        self.snapshots.borrow_mut().push(snapshot.clone());
        Ok(())
    }

    fn append_equity(&self, points: &[EquityPoint]) -> Result<(), DeskError> {
        self.equity.borrow_mut().extend_from_slice(points);
        Ok(())
    }

    fn read_snapshot_history(&self) -> Result<SnapshotHistory, DeskError> {
        Ok(SnapshotHistory::new(self.snapshots.borrow().clone()))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    date(2024, 6, day).and_hms_opt(hour, 0, 0).unwrap()
}

pub fn make_bar(symbol: &str, date: NaiveDate, close: f64) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 100_000,
    }
}

/// Consecutive daily bars starting 2024-01-01.
pub fn series(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(symbol, date(2024, 1, 1) + chrono::Duration::days(i as i64), c))
        .collect()
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn request(duration: &str) -> HistoryRequest {
    HistoryRequest::parse(duration, "1 day").unwrap()
}
