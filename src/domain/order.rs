//! Orders, broker fills and realized trade records.

use chrono::NaiveDateTime;

use super::error::DeskError;
use super::signal::SignalValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn parse(input: &str) -> Result<Self, DeskError> {
        match input.trim().to_lowercase().as_str() {
            "market" | "mkt" => Ok(OrderType::Market),
            "limit" | "lmt" => Ok(OrderType::Limit),
            other => Err(DeskError::config_invalid(
                "ibkr",
                "order_type",
                format!("unknown order type '{other}' (expected market or limit)"),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

/// A proposed order. `quantity` is always positive; direction lives in `side`.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: u64) -> Self {
        Order {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
        }
    }

    /// Signed share change this order applies to a position.
    pub fn signed_quantity(&self) -> i64 {
        self.side.sign() * self.quantity as i64
    }

    /// Re-express as `order_type`, pricing limits at `reference_price`.
    pub fn with_type(mut self, order_type: OrderType, reference_price: f64) -> Self {
        self.order_type = order_type;
        self.limit_price = match order_type {
            OrderType::Market => None,
            OrderType::Limit => Some(reference_price),
        };
        self
    }
}

/// Outcome of a broker submission within the fill timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub filled: bool,
    pub filled_quantity: u64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Filled,
    Unfilled,
    Failed,
    DryRun,
    Simulated,
}

/// Realized (or intended) trade record; one per order that reached the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub fill_price: f64,
    pub reference_price: f64,
    pub signal_value: SignalValue,
    pub status: TradeStatus,
}
