//! Append-only persistence sink for run records.

use crate::domain::error::DeskError;
use crate::domain::metrics::EquityPoint;
use crate::domain::order::Trade;
use crate::domain::snapshot::{PortfolioSnapshot, PositionRow, SnapshotHistory};

pub trait RecordPort {
    fn append_trades(&self, trades: &[Trade]) -> Result<(), DeskError>;
    fn append_positions(&self, rows: &[PositionRow]) -> Result<(), DeskError>;
    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), DeskError>;
    fn append_equity(&self, points: &[EquityPoint]) -> Result<(), DeskError>;

    /// Snapshots written by earlier runs, oldest first.
    fn read_snapshot_history(&self) -> Result<SnapshotHistory, DeskError>;
}
