//! Broker-side position snapshot.

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: i64, avg_cost: f64) -> Self {
        Position {
            symbol: symbol.into(),
            quantity,
            avg_cost,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// `(price - avg_cost) * quantity`, or 0 when there is nothing to mark.
    pub fn unrealized_pnl(&self, price: Option<f64>) -> f64 {
        match price {
            Some(p) if self.quantity != 0 && self.avg_cost != 0.0 => {
                (p - self.avg_cost) * self.quantity as f64
            }
            _ => 0.0,
        }
    }
}
