//! Proportional transaction cost model.

use std::collections::BTreeMap;

use super::order::Order;

/// Cost charged as a fixed number of basis points on traded notional.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostModel {
    pub cost_bps: f64,
}

impl CostModel {
    pub fn new(cost_bps: f64) -> Self {
        CostModel { cost_bps }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0)
    }

    /// `turnover * cost_bps / 10_000`, never negative.
    pub fn cost(&self, turnover: f64) -> f64 {
        (turnover.abs() * self.cost_bps.max(0.0) / 10_000.0).max(0.0)
    }

    /// Cost as a fraction of `portfolio_value`.
    pub fn cost_pct(&self, turnover: f64, portfolio_value: f64) -> f64 {
        if portfolio_value > 0.0 {
            self.cost(turnover) / portfolio_value
        } else {
            0.0
        }
    }
}

/// Sum of `quantity * price` over orders. Orders without a price contribute
/// nothing.
pub fn turnover(orders: &[Order], prices: &BTreeMap<String, f64>) -> f64 {
    orders
        .iter()
        .filter_map(|o| prices.get(&o.symbol).map(|p| o.quantity as f64 * p.abs()))
        .fold(0.0, |acc, x| acc + x)
}
