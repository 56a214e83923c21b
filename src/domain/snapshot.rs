//! Run-to-run P&L continuity for the live desk.
//!
//! Prior snapshots are handed in explicitly; nothing here reads or writes
//! storage.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub timestamp: NaiveDateTime,
    pub portfolio_value: f64,
    /// Change since the previous snapshot; `None` on the first run.
    pub daily_pnl: Option<f64>,
    /// Change since the first recorded snapshot; `None` on the first run.
    pub running_pnl: Option<f64>,
}

/// Previously persisted snapshots, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotHistory {
    pub snapshots: Vec<PortfolioSnapshot>,
}

impl SnapshotHistory {
    pub fn new(snapshots: Vec<PortfolioSnapshot>) -> Self {
        SnapshotHistory { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn first(&self) -> Option<&PortfolioSnapshot> {
        self.snapshots.first()
    }

    pub fn last(&self) -> Option<&PortfolioSnapshot> {
        self.snapshots.last()
    }

    /// Snapshot for a new run valued at `portfolio_value`.
    pub fn next(&self, timestamp: NaiveDateTime, portfolio_value: f64) -> PortfolioSnapshot {
        let (daily_pnl, running_pnl) = match (self.first(), self.last()) {
            (Some(first), Some(prev)) => (
                Some(portfolio_value - prev.portfolio_value),
                Some(portfolio_value - first.portfolio_value),
            ),
            _ => (None, None),
        };
        PortfolioSnapshot {
            timestamp,
            portfolio_value,
            daily_pnl,
            running_pnl,
        }
    }

    pub fn push(&mut self, snapshot: PortfolioSnapshot) {
        self.snapshots.push(snapshot);
    }
}

/// One row of the position log.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub position: i64,
    pub avg_cost: f64,
    pub unrealized_pnl: f64,
}

pub fn position_rows(
    timestamp: NaiveDateTime,
    positions: &[Position],
    closes: &BTreeMap<String, f64>,
) -> Vec<PositionRow> {
    positions
        .iter()
        .map(|p| PositionRow {
            timestamp,
            symbol: p.symbol.clone(),
            position: p.quantity,
            avg_cost: p.avg_cost,
            unrealized_pnl: p.unrealized_pnl(closes.get(&p.symbol).copied()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(16, 5, 0)
            .unwrap()
    }

    #[test]
    fn first_run_has_no_pnl() {
        let snap = SnapshotHistory::default().next(ts(1), 100_000.0);
        assert_eq!(snap.daily_pnl, None);
        assert_eq!(snap.running_pnl, None);
    }

    #[test]
    fn pnl_across_three_runs() {
        let mut history = SnapshotHistory::default();
        for (day, value) in [(1, 100_000.0), (2, 101_000.0)] {
            let snap = history.next(ts(day), value);
            history.push(snap);
        }
        assert_eq!(history.snapshots[1].daily_pnl, Some(1_000.0));

        let third = history.next(ts(3), 99_500.0);
        assert_eq!(third.daily_pnl, Some(-1_500.0));
        assert_eq!(third.running_pnl, Some(-500.0));
    }

    #[test]
    fn position_rows_mark_unrealized() {
        let positions = vec![Position::new("SPY", 10, 400.0), Position::new("QQQ", 5, 300.0)];
        let closes: BTreeMap<String, f64> = [("SPY".to_string(), 410.0)].into_iter().collect();
        let rows = position_rows(ts(1), &positions, &closes);
        assert_eq!(rows.len(), 2);
        assert!((rows[0].unrealized_pnl - 100.0).abs() < 1e-9);
        assert_eq!(rows[1].unrealized_pnl, 0.0);
    }
}
