//! CSV record sink.
//!
//! Live logs are append-only: every file gets its header the first time it
//! is created and rows are only ever appended. Backtest output is written
//! fresh and never overwrites an existing file. Column order is fixed.

use crate::domain::error::DeskError;
use crate::domain::metrics::EquityPoint;
use crate::domain::order::{Trade, TradeStatus};
use crate::domain::snapshot::{PortfolioSnapshot, PositionRow, SnapshotHistory};
use crate::ports::record_port::RecordPort;
use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const TRADE_HEADER: [&str; 8] = [
    "timestamp",
    "symbol",
    "side",
    "quantity",
    "fill_price",
    "reference_price",
    "signal_value",
    "status",
];
const POSITION_HEADER: [&str; 5] = ["timestamp", "symbol", "position", "avg_cost", "unrealized_pnl"];
const SNAPSHOT_HEADER: [&str; 4] = ["timestamp", "portfolio_value", "daily_pnl", "running_pnl"];
const EQUITY_HEADER: [&str; 4] = ["date", "portfolio_value", "turnover", "cost"];

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPaths {
    pub trades: PathBuf,
    pub positions: Option<PathBuf>,
    pub snapshots: Option<PathBuf>,
    pub equity: Option<PathBuf>,
}

impl RecordPaths {
    /// Live desk logs under `dir`.
    pub fn live(dir: &Path) -> Self {
        RecordPaths {
            trades: dir.join("live_trades.csv"),
            positions: Some(dir.join("live_portfolio.csv")),
            snapshots: Some(dir.join("live_snapshot.csv")),
            equity: None,
        }
    }

    /// Backtest output: the equity curve at `out`, trades next to it as
    /// `<stem>_trades.csv`.
    pub fn backtest(out: &Path) -> Self {
        let stem = out
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backtest".to_string());
        RecordPaths {
            trades: out.with_file_name(format!("{stem}_trades.csv")),
            positions: None,
            snapshots: None,
            equity: Some(out.to_path_buf()),
        }
    }

    /// Every file these paths would write to.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.trades.as_path()).chain(
            [&self.positions, &self.snapshots, &self.equity]
                .into_iter()
                .filter_map(|p| p.as_deref()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Append,
    CreateNew,
}

pub struct CsvRecordAdapter {
    paths: RecordPaths,
    mode: WriteMode,
}

fn record_err(path: &Path, e: impl std::fmt::Display) -> DeskError {
    DeskError::Record {
        reason: format!("{}: {}", path.display(), e),
    }
}

fn configured<'a>(path: &'a Option<PathBuf>, what: &str) -> Result<&'a Path, DeskError> {
    path.as_deref().ok_or_else(|| DeskError::Record {
        reason: format!("no {what} file for this run"),
    })
}

fn fmt_money(value: f64) -> String {
    format!("{value:.2}")
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt_money).unwrap_or_default()
}

pub fn status_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Filled => "filled",
        TradeStatus::Unfilled => "unfilled",
        TradeStatus::Failed => "failed",
        TradeStatus::DryRun => "dry_run",
        TradeStatus::Simulated => "simulated",
    }
}

impl CsvRecordAdapter {
    /// Appends to existing files, writing headers only for new ones.
    pub fn new(paths: RecordPaths) -> Self {
        Self {
            paths,
            mode: WriteMode::Append,
        }
    }

    /// Writes each file from scratch. Fails if a file already exists.
    pub fn fresh(paths: RecordPaths) -> Self {
        Self {
            paths,
            mode: WriteMode::CreateNew,
        }
    }

    pub fn paths(&self) -> &RecordPaths {
        &self.paths
    }

    fn write_rows(
        &self,
        path: &Path,
        header: &[&str],
        rows: impl IntoIterator<Item = Vec<String>>,
    ) -> Result<(), DeskError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| record_err(parent, e))?;
        }
        let mut options = OpenOptions::new();
        let needs_header = match self.mode {
            WriteMode::Append => {
                options.create(true).append(true);
                fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
            }
            WriteMode::CreateNew => {
                options.create_new(true).write(true);
                true
            }
        };
        let file = options.open(path).map_err(|e| record_err(path, e))?;

        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer.write_record(header).map_err(|e| record_err(path, e))?;
        }
        let mut count = 0usize;
        for row in rows {
            writer.write_record(&row).map_err(|e| record_err(path, e))?;
            count += 1;
        }
        writer.flush().map_err(|e| record_err(path, e))?;
        tracing::debug!(file = %path.display(), rows = count, mode = ?self.mode, "wrote records");
        Ok(())
    }
}

impl RecordPort for CsvRecordAdapter {
    fn append_trades(&self, trades: &[Trade]) -> Result<(), DeskError> {
        let rows = trades.iter().map(|t| {
            vec![
                t.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                t.symbol.clone(),
                t.side.as_str().to_string(),
                t.quantity.to_string(),
                t.fill_price.to_string(),
                t.reference_price.to_string(),
                t.signal_value.as_i8().to_string(),
                status_str(t.status).to_string(),
            ]
        });
        self.write_rows(&self.paths.trades, &TRADE_HEADER, rows)
    }

    fn append_positions(&self, rows: &[PositionRow]) -> Result<(), DeskError> {
        let rows = rows.iter().map(|r| {
            vec![
                r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                r.symbol.clone(),
                r.position.to_string(),
                r.avg_cost.to_string(),
                fmt_money(r.unrealized_pnl),
            ]
        });
        self.write_rows(configured(&self.paths.positions, "position")?, &POSITION_HEADER, rows)
    }

    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), DeskError> {
        let row = vec![
            snapshot.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            fmt_money(snapshot.portfolio_value),
            fmt_opt(snapshot.daily_pnl),
            fmt_opt(snapshot.running_pnl),
        ];
        self.write_rows(configured(&self.paths.snapshots, "snapshot")?, &SNAPSHOT_HEADER, [row])
    }

    fn append_equity(&self, points: &[EquityPoint]) -> Result<(), DeskError> {
        let rows = points.iter().map(|p| {
            vec![
                p.date.format("%Y-%m-%d").to_string(),
                fmt_money(p.portfolio_value),
                fmt_money(p.turnover),
                format!("{:.4}", p.cost),
            ]
        });
        self.write_rows(configured(&self.paths.equity, "equity")?, &EQUITY_HEADER, rows)
    }

    fn read_snapshot_history(&self) -> Result<SnapshotHistory, DeskError> {
        let Some(path) = self.paths.snapshots.as_deref() else {
            return Ok(SnapshotHistory::default());
        };
        if !path.exists() {
            return Ok(SnapshotHistory::default());
        }
        let mut rdr = csv::Reader::from_path(path).map_err(|e| record_err(path, e))?;

        let mut snapshots = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| record_err(path, e))?;
            match parse_snapshot(&record) {
                Some(s) => snapshots.push(s),
                None => {
                    tracing::warn!(file = %path.display(), row = line + 1, "skipping unreadable snapshot row")
                }
            }
        }
        Ok(SnapshotHistory::new(snapshots))
    }
}

fn parse_optional(field: Option<&str>) -> Option<Option<f64>> {
    match field.map(str::trim) {
        None | Some("") => Some(None),
        Some(v) => v.parse().ok().map(Some),
    }
}

fn parse_snapshot(record: &csv::StringRecord) -> Option<PortfolioSnapshot> {
    let timestamp = NaiveDateTime::parse_from_str(record.get(0)?.trim(), TIMESTAMP_FORMAT).ok()?;
    let portfolio_value: f64 = record.get(1)?.trim().parse().ok()?;
    Some(PortfolioSnapshot {
        timestamp,
        portfolio_value,
        daily_pnl: parse_optional(record.get(2))?,
        running_pnl: parse_optional(record.get(3))?,
    })
}
