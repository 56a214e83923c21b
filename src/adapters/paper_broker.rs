//! In-process paper broker.
//!
//! Positions and cash live in a small CSV book (`symbol,quantity,avg_cost`,
//! with cash stored under the `$CASH` symbol) that is rewritten after every
//! fill. Orders fill immediately at the supplied mark price; a limit order
//! whose limit does not cross the mark stays unfilled.

use crate::domain::error::DeskError;
use crate::domain::order::{Fill, Order, OrderType, Side};
use crate::domain::position::Position;
use crate::ports::broker_port::BrokerPort;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CASH_SYMBOL: &str = "$CASH";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaperBook {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
}

impl PaperBook {
    pub fn load(path: &Path, starting_cash: f64) -> Result<Self, DeskError> {
        if !path.exists() {
            return Ok(PaperBook {
                cash: starting_cash,
                positions: BTreeMap::new(),
            });
        }

        let mut rdr = csv::Reader::from_path(path).map_err(|e| book_err(path, e))?;
        let mut book = PaperBook {
            cash: starting_cash,
            positions: BTreeMap::new(),
        };
        for result in rdr.records() {
            let record = result.map_err(|e| book_err(path, e))?;
            let (Some(symbol), Some(qty), Some(avg)) = (record.get(0), record.get(1), record.get(2))
            else {
                return Err(book_err(path, "expected symbol,quantity,avg_cost"));
            };
            let avg_cost: f64 = avg.trim().parse().map_err(|e| book_err(path, e))?;
            if symbol.trim() == CASH_SYMBOL {
                book.cash = avg_cost;
                continue;
            }
            let quantity: i64 = qty.trim().parse().map_err(|e| book_err(path, e))?;
            if quantity != 0 {
                let symbol = symbol.trim().to_uppercase();
                book.positions
                    .insert(symbol.clone(), Position::new(symbol, quantity, avg_cost));
            }
        }
        Ok(book)
    }

    pub fn save(&self, path: &Path) -> Result<(), DeskError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| book_err(parent, e))?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(|e| book_err(path, e))?;
        writer
            .write_record(["symbol", "quantity", "avg_cost"])
            .map_err(|e| book_err(path, e))?;
        writer
            .write_record([CASH_SYMBOL.to_string(), "0".to_string(), self.cash.to_string()])
            .map_err(|e| book_err(path, e))?;
        for p in self.positions.values() {
            writer
                .write_record([p.symbol.clone(), p.quantity.to_string(), p.avg_cost.to_string()])
                .map_err(|e| book_err(path, e))?;
        }
        writer.flush().map_err(|e| book_err(path, e))?;
        Ok(())
    }

    /// Apply a fill of `quantity` shares at `price`.
    pub fn apply(&mut self, symbol: &str, side: Side, quantity: u64, price: f64) {
        let signed = side.sign() * quantity as i64;
        self.cash -= signed as f64 * price;

        let entry = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(symbol, 0, 0.0));
        let new_qty = entry.quantity + signed;
        if side == Side::Buy && new_qty != 0 {
            entry.avg_cost =
                (entry.quantity as f64 * entry.avg_cost + quantity as f64 * price) / new_qty as f64;
        }
        entry.quantity = new_qty;
        if new_qty == 0 {
            self.positions.remove(symbol);
        }
    }

    pub fn value(&self, marks: &BTreeMap<String, f64>) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|p| p.market_value(marks.get(&p.symbol).copied().unwrap_or(p.avg_cost)))
                .sum::<f64>()
    }
}

fn book_err(path: &Path, e: impl std::fmt::Display) -> DeskError {
    DeskError::DataSourceUnavailable {
        reason: format!("paper book {}: {}", path.display(), e),
    }
}

pub struct PaperBroker {
    book_path: PathBuf,
    book: RefCell<PaperBook>,
    marks: BTreeMap<String, f64>,
}

impl PaperBroker {
    pub fn open(
        book_path: PathBuf,
        starting_cash: f64,
        marks: BTreeMap<String, f64>,
    ) -> Result<Self, DeskError> {
        let book = PaperBook::load(&book_path, starting_cash)?;
        tracing::info!(
            book = %book_path.display(),
            cash = book.cash,
            positions = book.positions.len(),
            "opened paper book"
        );
        Ok(Self {
            book_path,
            book: RefCell::new(book),
            marks,
        })
    }

    pub fn book(&self) -> PaperBook {
        self.book.borrow().clone()
    }

    fn crosses(order: &Order, mark: f64) -> bool {
        match (order.order_type, order.limit_price) {
            (OrderType::Market, _) | (OrderType::Limit, None) => true,
            (OrderType::Limit, Some(limit)) => match order.side {
                Side::Buy => limit >= mark,
                Side::Sell => limit <= mark,
            },
        }
    }
}

impl BrokerPort for PaperBroker {
    fn fetch_positions(&self) -> Result<Vec<Position>, DeskError> {
        Ok(self.book.borrow().positions.values().cloned().collect())
    }

    fn portfolio_value(&self) -> Result<f64, DeskError> {
        Ok(self.book.borrow().value(&self.marks))
    }

    fn submit_order(&self, order: &Order, _timeout: Duration) -> Result<Fill, DeskError> {
        if order.quantity == 0 {
            return Err(DeskError::OrderSubmission {
                symbol: order.symbol.clone(),
                reason: "zero quantity".to_string(),
            });
        }
        let mark = self
            .marks
            .get(&order.symbol)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| DeskError::OrderSubmission {
                symbol: order.symbol.clone(),
                reason: "no quote".to_string(),
            })?;

        if order.side == Side::Sell {
            let held = self
                .book
                .borrow()
                .positions
                .get(&order.symbol)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if (order.quantity as i64) > held {
                return Err(DeskError::OrderSubmission {
                    symbol: order.symbol.clone(),
                    reason: format!("sell {} exceeds position {}", order.quantity, held),
                });
            }
        }

        if !Self::crosses(order, mark) {
            return Ok(Fill {
                filled: false,
                filled_quantity: 0,
                avg_price: 0.0,
            });
        }

        let price = match order.limit_price {
            Some(limit) if order.order_type == OrderType::Limit => limit,
            _ => mark,
        };
        {
            let mut book = self.book.borrow_mut();
            book.apply(&order.symbol, order.side, order.quantity, price);
            book.save(&self.book_path)?;
        }
        Ok(Fill {
            filled: true,
            filled_quantity: order.quantity,
            avg_price: price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn marks(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn broker(dir: &TempDir) -> PaperBroker {
        PaperBroker::open(
            dir.path().join("book.csv"),
            10_000.0,
            marks(&[("SPY", 100.0), ("QQQ", 50.0)]),
        )
        .unwrap()
    }

    #[test]
    fn market_buy_fills_at_mark_and_persists() {
        let dir = TempDir::new().unwrap();
        let b = broker(&dir);
        let fill = b
            .submit_order(&Order::market("SPY", Side::Buy, 10), Duration::from_secs(1))
            .unwrap();
        assert!(fill.filled);
        assert_eq!(fill.avg_price, 100.0);
        assert_eq!(b.portfolio_value().unwrap(), 10_000.0);

        let reopened = PaperBook::load(&dir.path().join("book.csv"), 0.0).unwrap();
        assert_eq!(reopened.cash, 9_000.0);
        assert_eq!(reopened.positions["SPY"].quantity, 10);
    }

    #[test]
    fn averaging_into_position() {
        let mut book = PaperBook::default();
        book.apply("SPY", Side::Buy, 10, 100.0);
        book.apply("SPY", Side::Buy, 10, 110.0);
        assert_eq!(book.positions["SPY"].avg_cost, 105.0);
        book.apply("SPY", Side::Sell, 20, 120.0);
        assert!(book.positions.is_empty());
        assert_eq!(book.cash, -2_100.0 + 2_400.0);
    }

    #[test]
    fn limit_below_mark_stays_unfilled() {
        let dir = TempDir::new().unwrap();
        let b = broker(&dir);
        let order = Order::market("QQQ", Side::Buy, 5).with_type(OrderType::Limit, 49.0);
        let fill = b.submit_order(&order, Duration::from_secs(1)).unwrap();
        assert!(!fill.filled);
        assert!(b.fetch_positions().unwrap().is_empty());
    }

    #[test]
    fn unknown_symbol_is_submission_error() {
        let dir = TempDir::new().unwrap();
        let b = broker(&dir);
        let err = b
            .submit_order(&Order::market("IWM", Side::Buy, 1), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, DeskError::OrderSubmission { symbol, .. } if symbol == "IWM"));
    }

    #[test]
    fn oversell_is_rejected() {
        let dir = TempDir::new().unwrap();
        let b = broker(&dir);
        let err = b
            .submit_order(&Order::market("SPY", Side::Sell, 1), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, DeskError::OrderSubmission { .. }));
    }
}
