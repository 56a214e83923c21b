//! CSV file data adapter.
//!
//! Reads `<SYMBOL>.csv` files with a `date,open,high,low,close,volume` header
//! from a base directory.

use crate::domain::error::DeskError;
use crate::domain::ohlcv::{Bar, HistoryRequest};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    symbol: &str,
) -> Result<T, DeskError>
where
    T::Err: std::fmt::Display,
{
    let raw = record.get(index).ok_or_else(|| DeskError::MalformedBars {
        symbol: symbol.to_string(),
        reason: format!("missing {} column", name),
    })?;
    raw.trim().parse().map_err(|e| DeskError::MalformedBars {
        symbol: symbol.to_string(),
        reason: format!("invalid {} value '{}': {}", name, raw, e),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str, request: &HistoryRequest) -> Result<Vec<Bar>, DeskError> {
        if !self.base_path.is_dir() {
            return Err(DeskError::DataSourceUnavailable {
                reason: format!("data directory {} not found", self.base_path.display()),
            });
        }

        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(DeskError::NoData {
                symbol: symbol.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| DeskError::MalformedBars {
                symbol: symbol.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str: String = field(&record, 0, "date", symbol)?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                DeskError::MalformedBars {
                    symbol: symbol.to_string(),
                    reason: format!("invalid date '{}': {}", date_str, e),
                }
            })?;

            let volume: f64 = field(&record, 5, "volume", symbol)?;

            bars.push(Bar {
                symbol: symbol.to_string(),
                date,
                open: field(&record, 1, "open", symbol)?,
                high: field(&record, 2, "high", symbol)?,
                low: field(&record, 3, "low", symbol)?,
                close: field(&record, 4, "close", symbol)?,
                volume: volume as i64,
            });
        }

        bars.sort_by_key(|b| b.date);
        let trailing = request.duration.trailing(&bars).to_vec();
        tracing::debug!(
            symbol,
            file = %path.display(),
            total = bars.len(),
            kept = trailing.len(),
            "read bar file"
        );
        Ok(trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(duration: &str) -> HistoryRequest {
        HistoryRequest::parse(duration, "1 day").unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n";

        fs::write(path.join("SPY.csv"), csv_content).unwrap();
        fs::write(path.join("QQQ.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(
            path.join("BAD.csv"),
            "date,open,high,low,close,volume\n2024-01-15,abc,1,1,1,1\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_bars_returns_sorted_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("SPY", &request("1 Y")).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 50000);
        assert_eq!(bars[2].close, 115.0);
    }

    #[test]
    fn fetch_bars_keeps_trailing_days() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("SPY", &request("2 D")).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }

    #[test]
    fn fetch_bars_missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let result = adapter.fetch_bars("XYZ", &request("20 D"));
        assert!(matches!(result, Err(DeskError::NoData { symbol }) if symbol == "XYZ"));
    }

    #[test]
    fn fetch_bars_empty_file_is_empty() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(adapter.fetch_bars("QQQ", &request("20 D")).unwrap().is_empty());
    }

    #[test]
    fn fetch_bars_bad_value_is_malformed() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let result = adapter.fetch_bars("BAD", &request("20 D"));
        assert!(matches!(result, Err(DeskError::MalformedBars { .. })));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let adapter = CsvAdapter::new(PathBuf::from("/nonexistent/bars"));
        let result = adapter.fetch_bars("SPY", &request("20 D"));
        assert!(matches!(result, Err(DeskError::DataSourceUnavailable { .. })));
    }

}
