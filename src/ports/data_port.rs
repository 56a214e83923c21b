//! Market data port.

use crate::domain::error::DeskError;
use crate::domain::ohlcv::{Bar, HistoryRequest};

pub trait DataPort {
    /// Bars for `symbol` covering `request`, oldest first.
    ///
    /// An unknown symbol is [`DeskError::NoData`]; an unreachable source is
    /// [`DeskError::DataSourceUnavailable`].
    fn fetch_bars(&self, symbol: &str, request: &HistoryRequest) -> Result<Vec<Bar>, DeskError>;
}
